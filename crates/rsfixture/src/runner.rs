//! Run configuration, per-test reports and the tree-formatted output.
//!
//! ```text
//! ✓ widget_has_parts
//! ✗ database_roundtrip (212ms)
//!     Error: fixture `open_db` failed: connection refused
//! ✓ nested
//!   ✓ first
//!   - second (skipped: not on CI)
//! ```

use std::time::Duration;

use crate::engine::RegisteredTest;
use crate::error::Error;
use crate::labels::{LabelSet, DEFAULT_LABEL};

/// Environment variable consulted for the label selector when no
/// `--labels` argument is given.
pub const LABELS_ENV: &str = "RSFIXTURE_LABELS";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration parsed from command-line args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Labels selecting which tests run.
    pub labels: LabelSet,
    /// Only run tests whose name contains this (case-insensitive).
    pub filter: Option<String>,
    /// Only list the selected tests, don't run them.
    pub list: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            labels: LabelSet::from(&[DEFAULT_LABEL][..]),
            filter: None,
            list: false,
        }
    }
}

impl RunConfig {
    /// Parse from the process args (compatible with `cargo test -- <args>`),
    /// falling back to `RSFIXTURE_LABELS` for the label selector.
    pub fn from_args() -> Self {
        let env_labels = std::env::var(LABELS_ENV).ok();
        RunConfig::parse(std::env::args().skip(1), env_labels.as_deref())
    }

    /// Parse an argument list without the binary name.
    pub fn parse<I, S>(args: I, env_labels: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut config = RunConfig::default();
        let mut selector = env_labels
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--list" => config.list = true,
                "--labels" => {
                    if let Some(value) = args.get(i + 1) {
                        selector = Some(value.clone());
                        i += 1;
                    }
                }
                arg if arg.starts_with("--labels=") => {
                    selector = Some(arg["--labels=".len()..].to_string());
                }
                arg if !arg.starts_with('-') => {
                    config.filter = Some(arg.to_string());
                }
                _ => {} // ignore unknown flags
            }
            i += 1;
        }

        if let Some(selector) = selector {
            config.labels = LabelSet::parse_selector(&selector);
        }
        config
    }

    pub fn with_labels(mut self, selector: &str) -> Self {
        self.labels = LabelSet::parse_selector(selector);
        self
    }

    pub fn matches_name(&self, name: &str) -> bool {
        match &self.filter {
            Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
            None => true,
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Final state of a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed(Error),
    Skipped(String),
}

impl Status {
    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed(_))
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Status::Passed)
    }
}

/// Outcome of one test, with its sub-tests nested beneath it.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub name: String,
    pub path: String,
    pub labels: LabelSet,
    pub status: Status,
    pub elapsed: Duration,
    pub children: Vec<TestReport>,
}

impl TestReport {
    /// Find a sub-test by name, searching depth-first.
    pub fn find(&self, name: &str) -> Option<&TestReport> {
        self.children
            .iter()
            .find_map(|c| if c.name == name { Some(c) } else { c.find(name) })
    }
}

/// Results from a run. Sub-tests are counted alongside top-level tests.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
    pub reports: Vec<TestReport>,
}

impl RunSummary {
    pub fn record(&mut self, report: TestReport) {
        self.count(&report);
        self.reports.push(report);
    }

    fn count(&mut self, report: &TestReport) {
        match &report.status {
            Status::Passed => self.passed += 1,
            Status::Skipped(_) => self.skipped += 1,
            Status::Failed(err) => {
                self.failed += 1;
                self.failures.push(format!("{}: {err}", report.path));
            }
        }
        for child in &report.children {
            self.count(child);
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else {
            0
        }
    }
}

// ============================================================================
// ANSI color helpers
// ============================================================================

fn use_color() -> bool {
    // Respect NO_COLOR env var (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

fn paint(code: &str, s: &str) -> String {
    if use_color() {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(s: &str) -> String {
    paint("32", s)
}

fn red(s: &str) -> String {
    paint("31", s)
}

fn yellow(s: &str) -> String {
    paint("33", s)
}

fn dim(s: &str) -> String {
    paint("2", s)
}

// ============================================================================
// Output
// ============================================================================

pub(crate) fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {warning}", yellow("warning:"));
    }
}

pub(crate) fn print_list(tests: &[&RegisteredTest]) {
    for test in tests {
        println!("{} {}", test.name(), dim(&format!("[{}]", test.labels())));
    }
}

/// Print a report and its sub-tests, indented by depth.
pub fn print_report(report: &TestReport, depth: usize) {
    let indent = "  ".repeat(depth);
    let ms = report.elapsed.as_millis();
    let time_str = if ms > 100 {
        format!(" {}", dim(&format!("({ms}ms)")))
    } else {
        String::new()
    };

    match &report.status {
        Status::Passed => println!("{indent}{} {}{}", green("✓"), report.name, time_str),
        Status::Skipped(reason) => println!(
            "{indent}{} {} {}",
            yellow("-"),
            dim(&report.name),
            dim(&format!("(skipped: {reason})"))
        ),
        Status::Failed(err) => {
            println!("{indent}{} {}{}", red("✗"), red(&report.name), time_str);
            println!("{indent}    {}", red(&format!("Error: {err}")));
        }
    }

    for child in &report.children {
        print_report(child, depth + 1);
    }
}

pub(crate) fn print_summary(summary: &RunSummary, elapsed: Duration) {
    let elapsed_str = format!("{:.3}s", elapsed.as_secs_f64());

    let parts: Vec<String> = [
        (summary.passed > 0).then(|| green(&format!("{} passed", summary.passed))),
        (summary.failed > 0).then(|| red(&format!("{} failed", summary.failed))),
        (summary.skipped > 0).then(|| dim(&format!("{} skipped", summary.skipped))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let counts = if parts.is_empty() {
        "0 tests".to_string()
    } else {
        parts.join(", ")
    };
    let line = format!("{counts} ({})", dim(&elapsed_str));

    println!();
    if summary.failed > 0 {
        println!("{}", red("FAIL"));
        println!("{line}");
        println!();
        println!("Failures:");
        for (i, failure) in summary.failures.iter().enumerate() {
            println!("  {}. {}", i + 1, failure);
        }
        println!();
    } else {
        println!("{}", green("PASS"));
        println!("{line}");
    }
}
