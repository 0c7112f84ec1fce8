//! Board manager CLI integration.
//!
//! [`ToolCli`] holds the resolved command prefix of the board/library
//! manager and routes every invocation through a [`ProcessRunner`]. Queries
//! that parse JSON live in [`query`]; installation logic lives in
//! [`library`] and [`platform`].

pub mod library;
pub mod platform;
pub mod query;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::util::log::BuildLog;
use crate::util::process::{ProcessBuilder, ProcessRunner, RunStatus};

pub use library::{LibraryError, LibraryManager, LibraryStatus};
pub use platform::{CoreError, CoreManager, CoreStatus};
pub use query::{LibraryEntry, PlatformEntry, QueryError, ToolQuery};

/// Handle to the board manager executable.
pub struct ToolCli<'a> {
    program: PathBuf,
    runner: &'a dyn ProcessRunner,
    log: &'a BuildLog<'a>,
    timeout: Option<Duration>,
}

impl<'a> ToolCli<'a> {
    /// Create a handle for `program`.
    pub fn new(
        program: impl AsRef<Path>,
        runner: &'a dyn ProcessRunner,
        log: &'a BuildLog<'a>,
    ) -> Self {
        ToolCli {
            program: program.as_ref().to_path_buf(),
            runner,
            log,
            timeout: None,
        }
    }

    /// Kill streamed commands that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The build log commands stream into.
    pub fn log(&self) -> &'a BuildLog<'a> {
        self.log
    }

    /// The runner executing commands.
    pub fn runner(&self) -> &'a dyn ProcessRunner {
        self.runner
    }

    /// Build a command with the standard `--no-color` prefix.
    pub fn command<I, S>(&self, args: I) -> ProcessBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        ProcessBuilder::new(&self.program).arg("--no-color").args(args)
    }

    /// Run a subcommand, streaming its output into the build log.
    pub fn run<I, S>(&self, args: I) -> Result<RunStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let cmd = self.command(args);
        self.runner.stream(&cmd, self.log, self.timeout)
    }

    /// Run a subcommand and report only whether it exited successfully.
    ///
    /// Spawn failures are logged and count as failure.
    pub fn run_ok<I, S>(&self, args: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match self.run(args) {
            Ok(status) => status.success(),
            Err(e) => {
                self.log.message(format!("error: {:#}", e));
                false
            }
        }
    }

    /// Run a subcommand in JSON mode and return its raw output.
    pub fn capture_json<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let cmd = ProcessBuilder::new(&self.program)
            .args(["--json", "--no-color"])
            .args(args);
        self.runner.capture(&cmd)
    }

    /// JSON query interface.
    pub fn query(&self) -> ToolQuery<'_> {
        ToolQuery::new(self)
    }
}
