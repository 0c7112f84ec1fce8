//! Terminal output for the command line front end.
//!
//! Status lines go to stderr as a right-aligned 12-column word followed by
//! the message. With `--message-format json` only the build events reach
//! stdout and every status line is suppressed. Lines from `build.log` are
//! echoed only in verbose mode; otherwise a phase progress bar is shown.

use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::util::log::OutputSink;

const STATUS_WIDTH: usize = 12;

/// How much the shell prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    #[default]
    Normal,
    /// Build log echoed, no progress bar
    Verbose,
}

/// Status words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Finished,
    Installed,
    Uploaded,
    Updated,
    Building,
    Checking,
    Installing,
    Upgrading,
    Info,
    Missing,
    Warning,
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Installed => "Installed",
            Status::Uploaded => "Uploaded",
            Status::Updated => "Updated",
            Status::Building => "Building",
            Status::Checking => "Checking",
            Status::Installing => "Installing",
            Status::Upgrading => "Upgrading",
            Status::Info => "Info",
            Status::Missing => "Missing",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    /// Bold ANSI color: green when done, cyan while working.
    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Installed | Status::Uploaded | Status::Updated => {
                "\x1b[1;32m"
            }
            Status::Building | Status::Checking | Status::Installing | Status::Upgrading => {
                "\x1b[1;36m"
            }
            Status::Info => "\x1b[1;34m",
            Status::Missing | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }
}

/// Output for one command invocation.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    json: bool,
    color: bool,
}

impl Shell {
    /// Create a shell from the global flags.
    ///
    /// JSON output wins over `--quiet` and `--verbose`; colors are used only
    /// on a terminal.
    pub fn from_flags(quiet: bool, verbose: bool, no_color: bool, json: bool) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };

        Shell {
            verbosity: if json { Verbosity::Normal } else { verbosity },
            json,
            color: !json && !no_color && io::stderr().is_terminal(),
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn is_verbose(&self) -> bool {
        !self.json && self.verbosity == Verbosity::Verbose
    }

    /// Print `{status:>12} {message}`. Quiet shells print errors only.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.json || (self.verbosity == Verbosity::Quiet && status != Status::Error) {
            return;
        }
        eprintln!("{} {}", self.format_status(status), msg);
    }

    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error, as an `error` event in JSON mode.
    pub fn error(&self, msg: impl Display) {
        if self.json {
            self.json_event(&serde_json::json!({
                "reason": "error",
                "message": msg.to_string()
            }));
        } else {
            self.status(Status::Error, msg);
        }
    }

    /// Print one JSON line to stdout. Ignored outside JSON mode.
    pub fn json_event(&self, event: &impl Serialize) {
        if !self.json {
            return;
        }
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("failed to serialize event: {}", e),
        }
        let _ = io::stdout().flush();
    }

    fn format_status(&self, status: Status) -> String {
        if self.color {
            format!(
                "{}{:>width$}\x1b[0m",
                status.color_code(),
                status.as_str(),
                width = STATUS_WIDTH
            )
        } else {
            format!("{:>width$}", status.as_str(), width = STATUS_WIDTH)
        }
    }

    /// Time an operation; see [`Span`].
    pub fn span(self: &Arc<Self>, status: Status, msg: impl Display) -> Span {
        if self.is_verbose() {
            self.status(status, msg);
        }
        Span {
            shell: Arc::clone(self),
            start: Instant::now(),
            finished: false,
        }
    }

    /// Progress over `total` pipeline phases, hidden unless the shell is in
    /// normal human mode.
    pub fn progress(&self, total: u64, msg: impl Display) -> Progress {
        if self.json || self.verbosity != Verbosity::Normal {
            return Progress { pb: None };
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        Progress { pb: Some(pb) }
    }
}

/// Build log lines reach the terminal only in verbose mode.
impl OutputSink for Shell {
    fn emit(&self, text: &str) {
        if self.is_verbose() {
            eprintln!("{}", text);
        }
    }
}

/// A timed operation.
///
/// The start line is printed only in verbose mode. An unfinished span that
/// took longer than [`Span::REPORT_AFTER`] reports its duration when dropped.
pub struct Span {
    shell: Arc<Shell>,
    start: Instant,
    finished: bool,
}

impl Span {
    pub const REPORT_AFTER: Duration = Duration::from_millis(200);

    /// Print `Finished {msg} in {elapsed}`.
    pub fn finish_with_message(mut self, msg: impl Display) {
        self.finished = true;
        self.shell.status(
            Status::Finished,
            format!("{} in {}", msg, format_duration(self.start.elapsed())),
        );
    }

    /// End without printing anything; the caller reports the failure.
    pub fn abandon(mut self) {
        self.finished = true;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let elapsed = self.start.elapsed();
        if self.shell.is_verbose() || elapsed > Self::REPORT_AFTER {
            self.shell
                .status(Status::Finished, format!("in {}", format_duration(elapsed)));
        }
    }
}

/// Phase progress bar; every method is a no-op when hidden.
pub struct Progress {
    pb: Option<ProgressBar>,
}

impl Progress {
    pub fn inc(&self, delta: u64) {
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    pub fn set_message(&self, msg: impl Display) {
        if let Some(pb) = &self.pb {
            pb.set_message(msg.to_string());
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.pb.is_none()
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let shell = Shell::from_flags(false, false, true, false);
        assert_eq!(shell.verbosity(), Verbosity::Normal);
        assert!(!shell.is_json());

        let shell = Shell::from_flags(true, false, true, false);
        assert_eq!(shell.verbosity(), Verbosity::Quiet);

        let shell = Shell::from_flags(false, true, true, false);
        assert!(shell.is_verbose());

        // JSON wins over quiet and verbose
        let shell = Shell::from_flags(true, true, false, true);
        assert!(shell.is_json());
        assert_eq!(shell.verbosity(), Verbosity::Normal);
        assert!(!shell.color);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "0.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_status_is_right_aligned() {
        let shell = Shell::from_flags(false, false, true, false);

        assert_eq!(shell.format_status(Status::Installing), "  Installing");
        assert_eq!(shell.format_status(Status::Error), "       error");
    }

    #[test]
    fn test_progress_hidden_outside_normal_mode() {
        assert!(Shell::from_flags(false, false, true, true).progress(14, "Building").is_hidden());
        assert!(Shell::from_flags(true, false, true, false).progress(14, "Building").is_hidden());
        assert!(Shell::from_flags(false, true, true, false).progress(14, "Building").is_hidden());

        let progress = Shell::from_flags(false, false, true, false).progress(14, "Building");
        assert!(!progress.is_hidden());
        progress.set_message("compile");
        progress.inc(3);
        progress.finish();
    }
}
