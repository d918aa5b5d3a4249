//! Terminal report rendering
//!
//! Renders per-case validation lines, optional extended detail, and the
//! run summary. Successful object-root assertions stay hidden; field
//! messages are truncated in the line view and shown in full in the
//! extended section when flagged.

use std::time::Duration;

use colored::Colorize;

use crate::runner::{CaseResult, MultiSuiteResult};

/// Knobs matching the CLI's report flags.
#[derive(Debug, Default, Clone)]
pub struct ReportOptions {
    /// Extended per-case detail even for passing tests.
    pub full: bool,
    /// Only test status, name, and description; failures still expand.
    pub tiny: bool,
    /// Keep failing tests short instead of expanding them.
    pub short_errors: bool,
    /// Hide passing tests entirely.
    pub errors_only: bool,
    /// Echo request/response headers even when the case ignores them.
    pub always_headers: bool,
    /// The root path shown in the summary line.
    pub tests_path: String,
}

const FIELD_MESSAGE_LIMIT: usize = 64;

pub fn print_report(
    opts: &ReportOptions,
    passed: bool,
    wall: Duration,
    results: &[MultiSuiteResult],
) {
    let mut total_passed = 0usize;
    let mut total_failed = 0usize;
    let mut cumulative = Duration::ZERO;

    println!();
    for suite in results {
        total_passed += suite.result.passed;
        total_failed += suite.result.failed;
        cumulative += suite.result.duration;

        println!(
            "[{}] {}",
            status_str(suite.passed, false),
            suite.file.display().to_string().bright_white().underline()
        );
        println!("  Suite Duration: {:.2?}", suite.result.duration);
        println!(
            "  Passed: {}, Failed: {}, Total: {}",
            suite.result.passed, suite.result.failed, suite.result.total
        );
        println!("{}", separator());

        for case in &suite.result.results {
            if opts.errors_only && case.passed {
                continue;
            }
            print_case_report(opts, case);
        }

        if let Some(error) = &suite.error {
            println!(
                "  {}",
                "One or more tests failed within execution and the test suite could not be completed:"
                    .bright_red()
            );
            println!("  {:?}\n", error);
        }
    }

    println!("{}", separator());
    println!(
        "[{}] {}",
        status_str(passed, false),
        opts.tests_path.bright_white()
    );
    println!(
        "{:<6}:Total Tests\n{:<6}:Passed\n{:<6}:Failed",
        total_passed + total_failed,
        total_passed,
        total_failed
    );
    println!(
        "\nTotal Execution Time: {:.2?} (CPU Time: {:.2?})",
        wall, cumulative
    );
    println!("{}", separator());
}

fn print_case_report(opts: &ReportOptions, case: &CaseResult) {
    let show_errors = !case.passed && !opts.short_errors;
    let show_extended = opts.full || show_errors;
    let show_fields = show_extended || !opts.tiny;

    println!(
        "  [{}] {} - {}",
        status_str(case.passed, case.skipped),
        case.name.bright_white(),
        case.description
    );
    println!("    {}: {:.2?}", "Test Duration".bright_white(), case.duration);
    println!(
        "  [{}] {}",
        case.method.bright_cyan(),
        case.route.bright_white()
    );

    if show_fields {
        let mut fields: Vec<_> = case.fields.iter().filter(|f| !f.ignore).collect();
        // status and header lines (no leading dot) sort ahead of payload
        // paths
        fields.sort_by_key(|f| (f.path.starts_with('.'), f.path.clone()));

        for field in fields {
            let message = truncated(&field.error);
            let (path_str, message_str) = if field.status {
                (field.path.bright_blue(), format!("{:?}", message).normal())
            } else {
                (
                    field.path.cyan(),
                    format!("{:?}", message).bright_yellow(),
                )
            };
            println!(
                "    [{}] {}: {}",
                validation_marker(field.status),
                path_str,
                message_str
            );
        }
    }
    println!();

    if show_extended {
        println!("    Route: {}", case.resolved_route);
        if let Some(code) = case.status_code {
            println!("    Status Code: {}", code);
        }

        if !case.request_headers.is_empty() || opts.always_headers {
            println!("    Request Headers:");
            for (name, value) in &case.request_headers {
                println!("      {}: {}", name, value);
            }
        }
        if case.validates_headers || opts.always_headers {
            println!(
                "    Response Headers: {}",
                pretty_json(&case.response_headers)
            );
        }

        println!("    Input: {}", pretty_json(&case.input));
        println!("    Response: {}\n", pretty_json(&case.response));

        let extended: Vec<_> = case.fields.iter().filter(|f| f.show_extended).collect();
        if !extended.is_empty() {
            println!("    Extended Output:");
            for field in extended {
                println!("      {}", field.path);
                println!("          {}:", field.error);
            }
        }
        println!("{}", separator());
    }
}

fn status_str(passed: bool, skipped: bool) -> String {
    if skipped {
        "Skipped".bright_black().to_string()
    } else if passed {
        "Passed".green().to_string()
    } else {
        "Failed".red().to_string()
    }
}

fn validation_marker(status: bool) -> String {
    if status {
        "*".green().to_string()
    } else {
        "x".red().to_string()
    }
}

fn truncated(message: &str) -> String {
    if message.chars().count() <= FIELD_MESSAGE_LIMIT {
        return message.to_string();
    }
    let cut: String = message.chars().take(FIELD_MESSAGE_LIMIT).collect();
    format!("{}...", cut)
}

fn pretty_json(value: &crate::value::Value) -> String {
    serde_json::to_string_pretty(&value.to_json())
        .unwrap_or_default()
        .replace('\n', "\n    ")
}

fn separator() -> String {
    "-".repeat(80).bright_white().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation() {
        let long = "a".repeat(100);
        let cut = truncated(&long);
        assert_eq!(cut.chars().count(), FIELD_MESSAGE_LIMIT + 3);
        assert!(cut.ends_with("..."));

        assert_eq!(truncated("short"), "short");
    }
}
