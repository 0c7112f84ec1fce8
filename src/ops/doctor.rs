//! Installation and host health checks.
//!
//! The `doctor` command verifies that an installation has everything a build
//! needs before the first phase runs.
//!
//! ## Checks Performed
//!
//! - Board manager and transpiler binaries
//! - Board catalog and the HAL sources it references
//! - Runtime headers and the sketch
//! - Board manager responding to a version query (optional)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::builder::context::BuildContext;
use crate::builder::host::HostInfo;
use crate::core::HalCatalog;
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// Result of a single health check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path the check looked at
    pub path: Option<PathBuf>,

    /// How long the check took
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..CheckResult::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the checked path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,

    /// Total time taken
    pub total_duration: Duration,

    /// Environment information
    pub environment: BTreeMap<String, String>,
}

impl DoctorReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        DoctorReport::default()
    }

    /// Add a check result.
    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Get the count of passed checks.
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Get the count of failed checks.
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Get the count of required failed checks.
    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Run every check against the installation described by `ctx`.
pub fn doctor(ctx: &BuildContext, catalog: &Path, runner: &dyn ProcessRunner) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::new();

    let host = HostInfo::detect(runner);
    report.environment.insert("os".into(), host.os.to_string());
    report.environment.insert("arch".into(), host.arch.to_string());
    report
        .environment
        .insert("cpus".into(), host.logical_cpus.to_string());
    report.environment.insert(
        "root".into(),
        ctx.layout.root().display().to_string(),
    );

    report.add(check_file("Board manager", &ctx.cli));
    report.add(check_file("Transpiler", &ctx.transpiler));
    report.add(check_catalog(ctx, catalog));
    report.add(check_dir("Runtime headers", &ctx.layout.lib_include_dir()));
    report.add(check_file("Sketch", &ctx.layout.sketch_path()));
    report.add(check_path_cli());
    if ctx.cli.is_file() {
        report.add(check_cli_version(ctx, runner));
    }

    report.total_duration = start.elapsed();
    report
}

fn check_file(name: &str, path: &Path) -> CheckResult {
    let start = Instant::now();
    let result = if path.is_file() {
        CheckResult::pass(name, "Found")
    } else {
        CheckResult::fail(name, "Not found")
    };
    result.with_path(path).with_duration(start.elapsed())
}

fn check_dir(name: &str, path: &Path) -> CheckResult {
    let start = Instant::now();
    let result = if path.is_dir() {
        CheckResult::pass(name, "Found")
    } else {
        CheckResult::fail(name, "Directory not found")
    };
    result.with_path(path).with_duration(start.elapsed())
}

/// The catalog must load and every HAL source it names must exist.
fn check_catalog(ctx: &BuildContext, path: &Path) -> CheckResult {
    let start = Instant::now();

    let catalog = match HalCatalog::load(path) {
        Ok(catalog) => catalog,
        Err(e) => {
            return CheckResult::fail("Board catalog", format!("{:#}", e))
                .with_path(path)
                .with_duration(start.elapsed())
        }
    };

    let hal_dir = ctx.layout.hal_dir();
    let missing: Vec<String> = catalog
        .iter()
        .filter(|(_, board)| !hal_dir.join(&board.source).is_file())
        .map(|(name, board)| format!("{} ({})", name, board.source))
        .collect();

    let result = if missing.is_empty() {
        CheckResult::pass("Board catalog", format!("{} boards", catalog.len()))
    } else {
        CheckResult::fail(
            "Board catalog",
            format!("Missing HAL sources: {}", missing.join(", ")),
        )
    };
    result.with_path(path).with_duration(start.elapsed())
}

/// A system-wide board manager, useful when the bundled one is broken.
fn check_path_cli() -> CheckResult {
    let start = Instant::now();
    match which::which("arduino-cli") {
        Ok(path) => CheckResult::pass("arduino-cli on PATH", "Found")
            .with_path(path)
            .with_duration(start.elapsed())
            .optional(),
        Err(_) => CheckResult::fail("arduino-cli on PATH", "Not found")
            .with_duration(start.elapsed())
            .optional(),
    }
}

fn check_cli_version(ctx: &BuildContext, runner: &dyn ProcessRunner) -> CheckResult {
    let start = Instant::now();
    let cmd = ProcessBuilder::new(&ctx.cli).arg("version");
    let result = match runner.capture(&cmd) {
        Ok(output) if !output.trim().is_empty() => CheckResult::pass(
            "Board manager version",
            output.lines().next().unwrap_or_default().trim().to_string(),
        ),
        Ok(_) => CheckResult::fail("Board manager version", "No output"),
        Err(e) => CheckResult::fail("Board manager version", format!("{:#}", e)),
    };
    result.with_duration(start.elapsed()).optional()
}

/// Format the doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    let mut lines = vec!["iecport doctor".to_string(), "==============".to_string(), String::new()];

    if verbose {
        lines.push("Environment:".to_string());
        for (key, value) in &report.environment {
            lines.push(format!("  {}: {}", key, value));
        }
        lines.push(String::new());
    }

    lines.push("Checks:".to_string());
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };
        lines.push(format!("  {} {}{}", status, check.name, required));

        if verbose || !check.passed {
            lines.push(format!("      {}", check.message));
            if let Some(path) = &check.path {
                lines.push(format!("      Path: {}", path.display()));
            }
        }
    }
    lines.push(String::new());

    let failed = report.failed_count();
    let required_failed = report.required_failed_count();
    lines.push(format!(
        "Summary: {} passed, {} failed",
        report.passed_count(),
        failed
    ));

    if required_failed > 0 {
        lines.push(format!(
            "\nWarning: {} required check(s) failed. Builds will not work.",
            required_failed
        ));
    } else if failed > 0 {
        lines.push(format!(
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        ));
    } else {
        lines.push("\nAll checks passed. iecport is ready to use.".to_string());
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}
