//! Test suite execution
//!
//! One suite file owns one data store, seeded from fixtures, the process
//! environment, and CLI overrides, in that order; later writers win.
//! Cases run sequentially so captures flow forward; suites never share
//! state with each other.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::store::DataStore;
use crate::transport::websocket::WsSession;
use crate::transport::ParserRegistry;
use crate::value::Value;

use super::case::{CaseResult, TestCase, TestCaseCfg};

#[derive(Debug, Default, Deserialize)]
struct SuiteFileCfg {
    #[serde(default)]
    tests: Vec<TestCaseCfg>,
}

/// A loaded suite, ready to execute.
pub struct TestSuite {
    pub path: PathBuf,
    pub tests: Vec<TestCase>,
    pub store: DataStore,
    registry: ParserRegistry,
    client: reqwest::Client,
}

/// Aggregate counts plus the per-case results, in declaration order.
#[derive(Debug, Default)]
pub struct SuiteResult {
    pub results: Vec<CaseResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub duration: Duration,
}

impl TestSuite {
    /// Load a suite file. Returns `None` when the file has no `tests`
    /// entry, so directory scans can skip unrelated YAML.
    pub fn load(
        path: &Path,
        fixtures: Option<&Path>,
        vars: &[(String, String)],
    ) -> Result<Option<TestSuite>> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to load test file: {} - {}", path.display(), e))
        })?;
        let cfg: SuiteFileCfg = serde_yaml::from_str(&data).map_err(|e| {
            Error::Config(format!("Failed to load test file: {} - {}", path.display(), e))
        })?;
        if cfg.tests.is_empty() {
            return Ok(None);
        }

        let mut tests = Vec::with_capacity(cfg.tests.len());
        for case_cfg in cfg.tests {
            tests.push(TestCase::load(case_cfg)?);
        }

        let mut store = DataStore::new();
        seed_store(&mut store, fixtures, vars)?;

        Ok(Some(TestSuite {
            path: path.to_path_buf(),
            tests,
            store,
            registry: ParserRegistry::with_defaults(),
            client: reqwest::Client::new(),
        }))
    }

    /// Run cases in declaration order. A case marked `exit` stops the
    /// suite when reached; failures never stop subsequent cases.
    pub async fn execute(&mut self, tag_filters: &[String]) -> SuiteResult {
        let timer = std::time::Instant::now();
        let mut result = SuiteResult {
            total: self.tests.len(),
            ..SuiteResult::default()
        };

        let mut ws: Option<WsSession> = None;
        for test in &self.tests {
            if test.cfg.exit {
                debug!(name = %test.cfg.name, "exit flag reached, ending suite early");
                break;
            }

            let case_result = test
                .execute(
                    &mut self.store,
                    &mut ws,
                    &self.client,
                    &self.registry,
                    tag_filters,
                )
                .await;

            if case_result.passed {
                result.passed += 1;
            } else {
                result.failed += 1;
            }
            result.results.push(case_result);
        }

        // any session a case left open belongs to this suite; close it
        if let Some(mut session) = ws.take() {
            session.close().await.ok();
        }

        result.duration = timer.elapsed();
        result
    }
}

/// Seeding order: fixtures file, then every process environment variable
/// as a top-level key, then CLI `--var` overrides.
fn seed_store(
    store: &mut DataStore,
    fixtures: Option<&Path>,
    vars: &[(String, String)],
) -> Result<()> {
    if let Some(fixtures) = fixtures {
        let meta = std::fs::metadata(fixtures).map_err(|e| {
            Error::Config(format!(
                "Failed to stat fixture file: {} - {}",
                fixtures.display(),
                e
            ))
        })?;
        if meta.is_dir() {
            return Err(Error::Config(format!(
                "Fixtures must be a file, not a directory: {}",
                fixtures.display()
            )));
        }

        let data = std::fs::read_to_string(fixtures)?;
        match Value::from_yaml_str(&data)? {
            Value::Map(map) => {
                for (key, value) in map {
                    store.put_raw(key, value);
                }
            }
            Value::Null => {}
            _ => {
                warn!(
                    file = %fixtures.display(),
                    "fixtures file is not a mapping, ignoring"
                );
            }
        }
    }

    for (key, value) in std::env::vars() {
        store.put_raw(key, Value::Str(value));
    }

    for (key, value) in vars {
        store.put_raw(key.clone(), Value::Str(value.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_skips_files_without_tests() {
        let file = write_temp("something: else\n");
        let suite = TestSuite::load(file.path(), None, &[]).unwrap();
        assert!(suite.is_none());
    }

    #[test]
    fn test_load_builds_cases() {
        let file = write_temp(
            "tests:\n  - name: first\n    route: \"http://x\"\n  - name: second\n    route: \"http://y\"\n",
        );
        let suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
        assert_eq!(suite.tests.len(), 2);
        assert_eq!(suite.tests[0].cfg.name, "first");
    }

    #[test]
    fn test_seeding_order() {
        let fixtures = write_temp("From_Fixtures: base\nShared_Seed_Key: fixtures\n");
        std::env::set_var("Shared_Seed_Key", "environment");
        let suite = TestSuite::load(
            write_temp("tests:\n  - name: t\n    route: \"http://x\"\n").path(),
            Some(fixtures.path()),
            &[("Cli_Seed_Key".to_string(), "cli".to_string())],
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            suite.store.get("From_Fixtures").unwrap(),
            Value::Str("base".into())
        );
        // environment overrides fixtures
        assert_eq!(
            suite.store.get("Shared_Seed_Key").unwrap(),
            Value::Str("environment".into())
        );
        assert_eq!(
            suite.store.get("Cli_Seed_Key").unwrap(),
            Value::Str("cli".into())
        );
        std::env::remove_var("Shared_Seed_Key");
    }

    #[tokio::test]
    async fn test_exit_flag_stops_suite() {
        let file = write_temp(
            "tests:\n  - name: first\n    skip: true\n  - name: stop\n    exit: true\n  - name: never\n    route: \"http://x\"\n",
        );
        let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
        let result = suite.execute(&[]).await;
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].name, "first");
    }

    #[tokio::test]
    async fn test_tag_filter_skips_and_passes() {
        let file = write_temp(
            "tests:\n  - name: tagged\n    tags: [smoke]\n    skip: true\n  - name: untagged\n    route: \"http://invalid.invalid\"\n",
        );
        let mut suite = TestSuite::load(file.path(), None, &[]).unwrap().unwrap();
        let result = suite.execute(&["smoke".to_string()]).await;
        // the untagged case is skipped as passing rather than attempted
        assert_eq!(result.failed, 0);
        assert!(result.results[1].skipped);
    }
}
