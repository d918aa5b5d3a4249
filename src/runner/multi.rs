//! Multi-suite scheduling
//!
//! Suite files discovered under a root run on a bounded pool of tokio
//! workers; each suite runs to completion on one worker with its own
//! store. Results arrive in completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::common::{Error, Result};

use super::suite::{SuiteResult, TestSuite};

/// One suite file's outcome.
#[derive(Debug, Default)]
pub struct MultiSuiteResult {
    pub file: PathBuf,
    pub passed: bool,
    pub result: SuiteResult,
    /// Load or execution errors that kept the suite from completing.
    pub error: Option<String>,
}

/// Recursively collect `*.yaml` files under `root`.
pub fn discover_suites(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_yaml_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_yaml_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "test root is not a directory: {}",
            dir.display()
        )));
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "yaml") {
            files.push(path);
        }
    }
    Ok(())
}

/// Execute suites on up to `threads` concurrent workers.
pub async fn run_suites(
    files: Vec<PathBuf>,
    fixtures: Option<PathBuf>,
    vars: Vec<(String, String)>,
    tags: Vec<String>,
    threads: usize,
    verbose: bool,
) -> (bool, Vec<MultiSuiteResult>, Duration) {
    if verbose {
        println!("Executing tests across {} threads...\n", threads.max(1));
    }
    let timer = Instant::now();
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let mut workers = JoinSet::new();

    for file in files {
        let semaphore = Arc::clone(&semaphore);
        let fixtures = fixtures.clone();
        let vars = vars.clone();
        let tags = tags.clone();
        workers.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("suite semaphore closed");

            if verbose {
                println!("> In Progress: {}", file.display());
            }
            let outcome = run_one(&file, fixtures.as_deref(), &vars, &tags).await;
            if verbose {
                let status = if outcome.passed { "Pass" } else { "Fail" };
                println!("< Done: [{}] {}", status, file.display());
            }
            outcome
        });
    }

    let mut results = Vec::new();
    let mut aggregate = true;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => {
                aggregate = aggregate && outcome.passed;
                results.push(outcome);
            }
            Err(e) => {
                warn!("suite worker panicked: {}", e);
                aggregate = false;
            }
        }
    }

    info!(suites = results.len(), passed = aggregate, "test run complete");
    (aggregate, results, timer.elapsed())
}

async fn run_one(
    file: &Path,
    fixtures: Option<&Path>,
    vars: &[(String, String)],
    tags: &[String],
) -> MultiSuiteResult {
    match TestSuite::load(file, fixtures, vars) {
        Ok(Some(mut suite)) => {
            let result = suite.execute(tags).await;
            MultiSuiteResult {
                file: file.to_path_buf(),
                passed: result.failed == 0,
                result,
                error: None,
            }
        }
        // YAML without a tests entry is not a suite; report it as an
        // empty pass so stray files under the root stay harmless
        Ok(None) => MultiSuiteResult {
            file: file.to_path_buf(),
            passed: true,
            result: SuiteResult::default(),
            error: None,
        },
        Err(e) => MultiSuiteResult {
            file: file.to_path_buf(),
            passed: false,
            result: SuiteResult::default(),
            error: Some(e.to_string()),
        },
    }
}
