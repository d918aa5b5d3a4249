//! apiprobe CLI - declarative integration-test runner for network APIs

use std::path::PathBuf;

use clap::Parser;

use apiprobe::common::logging;
use apiprobe::report::{print_report, ReportOptions};
use apiprobe::runner::{discover_suites, run_suites};

#[derive(Parser)]
#[command(name = "apiprobe", about = "Declarative integration-test runner for network APIs")]
#[command(version, long_about = None)]
struct Cli {
    /// Directory scanned recursively for *.yaml test suites
    #[arg(long = "test-root")]
    test_root: Option<PathBuf>,

    /// Single test suite file to execute
    #[arg(long)]
    file: Option<PathBuf>,

    /// YAML file with fixture data seeded into every suite's data store
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Maximum number of test suites executing concurrently
    #[arg(long, default_value_t = 16)]
    threads: usize,

    /// Only run cases matching this tag expression; repeatable, each value
    /// is an OR-list of comma-separated tags, prefix a tag with ! to negate
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// KEY=VALUE pair loaded into the data store after the environment;
    /// repeatable
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,

    /// Print the extended report for every test, not just failures
    #[arg(long)]
    full: bool,

    /// Print only test status, name, and description; failures still expand
    #[arg(long)]
    tiny: bool,

    /// Keep the report short when errors are encountered
    #[arg(long = "short-fail")]
    short_fail: bool,

    /// Only print failing tests
    #[arg(long = "errors-only")]
    errors_only: bool,

    /// Always echo request and response headers in extended output
    #[arg(long = "always-headers")]
    always_headers: bool,

    /// Disable colored output
    #[arg(long = "no-colors")]
    no_colors: bool,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", input))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();

    if cli.no_colors {
        colored::control::set_override(false);
    }

    let (files, tests_path) = match (&cli.file, &cli.test_root) {
        (Some(file), _) => (vec![file.clone()], file.display().to_string()),
        (None, Some(root)) => match discover_suites(root) {
            Ok(files) => (files, root.display().to_string()),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        (None, None) => {
            eprintln!("Error: provide a test suite with --file or a directory with --test-root");
            std::process::exit(2);
        }
    };

    if files.is_empty() {
        eprintln!("Error: no *.yaml test suites found under {tests_path}");
        std::process::exit(1);
    }

    let (passed, results, duration) = run_suites(
        files,
        cli.fixtures.clone(),
        cli.vars.clone(),
        cli.tags.clone(),
        cli.threads,
        true,
    )
    .await;

    let opts = ReportOptions {
        full: cli.full,
        tiny: cli.tiny,
        short_errors: cli.short_fail,
        errors_only: cli.errors_only,
        always_headers: cli.always_headers,
        tests_path,
    };
    print_report(&opts, passed, duration, &results);

    if !passed {
        std::process::exit(1);
    }
}
