//! Subprocess execution utilities.
//!
//! Two execution modes are provided through the [`ProcessRunner`] trait:
//!
//! - [`ProcessRunner::capture`] blocks until the command exits and returns its
//!   combined stdout/stderr as one string. Used for JSON queries.
//! - [`ProcessRunner::stream`] supervises a long-running command, forwarding
//!   every output line to a [`LineSink`] as soon as it arrives and killing the
//!   child once a wall-clock timeout expires.

use std::ffi::OsStr;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Interval between termination checks while streaming.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long output is still collected after the child exits.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Receives output lines from a supervised command.
pub trait LineSink {
    /// Handle one line of output (without the trailing newline).
    fn line(&self, line: &str);
}

impl<F> LineSink for F
where
    F: Fn(&str),
{
    fn line(&self, line: &str) {
        self(line)
    }
}

/// Exit status of a streamed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process exited with this code.
    Code(i32),
    /// The process was terminated by a signal and reported no exit code.
    Signaled,
    /// The process outlived its timeout and was killed.
    TimedOut,
}

impl RunStatus {
    /// Sentinel code reported for a timed-out command.
    pub const TIMEOUT_CODE: i32 = -1;

    /// Sentinel code reported for a signal-terminated command.
    pub const SIGNALED_CODE: i32 = -2;

    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Code(0))
    }

    /// Numeric status, using the sentinels for timeouts and signals.
    pub fn code(&self) -> i32 {
        match self {
            RunStatus::Code(code) => *code,
            RunStatus::Signaled => Self::SIGNALED_CODE,
            RunStatus::TimedOut => Self::TIMEOUT_CODE,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory, if one was set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

impl fmt::Display for ProcessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_command())
    }
}

/// Executes external commands.
///
/// Everything that talks to the board manager or the transpiler goes through
/// this trait so it can be replaced in tests.
pub trait ProcessRunner {
    /// Run to completion and return the combined, lossily decoded output.
    ///
    /// A non-zero exit status is not an error; the output is returned anyway.
    fn capture(&self, cmd: &ProcessBuilder) -> Result<String>;

    /// Run under supervision, forwarding output lines to `sink` as they arrive.
    fn stream(
        &self,
        cmd: &ProcessBuilder,
        sink: &dyn LineSink,
        timeout: Option<Duration>,
    ) -> Result<RunStatus>;
}

/// [`ProcessRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn capture(&self, cmd: &ProcessBuilder) -> Result<String> {
        tracing::debug!("capturing `{}`", cmd);

        let output = cmd
            .build_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute `{}`", cmd.get_program().display()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    fn stream(
        &self,
        cmd: &ProcessBuilder,
        sink: &dyn LineSink,
        timeout: Option<Duration>,
    ) -> Result<RunStatus> {
        tracing::debug!("streaming `{}` (timeout {:?})", cmd, timeout);
        sink.line(&format!("$ {}", cmd));

        let mut child = cmd
            .build_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", cmd.get_program().display()))?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        let start = Instant::now();
        let status = supervise(&mut child, &rx, sink, start, timeout)?;

        if status != RunStatus::TimedOut {
            let mut limit = DRAIN_GRACE;
            if let Some(timeout) = timeout {
                limit = limit.min(timeout.saturating_sub(start.elapsed()).max(POLL_INTERVAL));
            }
            if !drain(&rx, sink, Instant::now() + limit) {
                // A background process inherited the pipes; its readers are
                // left detached.
                tracing::debug!("output of `{}` still open after exit", cmd);
            }
        }
        drop(readers);

        sink.line(&format!("$? = {}", status));
        Ok(status)
    }
}

/// Poll the child for output and termination until it exits or times out.
fn supervise(
    child: &mut Child,
    rx: &Receiver<String>,
    sink: &dyn LineSink,
    start: Instant,
    timeout: Option<Duration>,
) -> Result<RunStatus> {
    let mut open = true;

    loop {
        if open {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => sink.line(&line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => open = false,
            }
        } else {
            thread::sleep(POLL_INTERVAL);
        }

        if let Some(status) = child.try_wait().context("failed to poll child process")? {
            return Ok(match status.code() {
                Some(code) => RunStatus::Code(code),
                None => RunStatus::Signaled,
            });
        }

        if let Some(limit) = timeout {
            if start.elapsed() > limit {
                tracing::warn!("command exceeded timeout of {:?}, killing it", limit);
                let _ = child.kill();
                let _ = child.wait();
                return Ok(RunStatus::TimedOut);
            }
        }
    }
}

/// Forward the remaining lines until every reader is done or `deadline`
/// passes. Returns whether every reader finished.
fn drain(rx: &Receiver<String>, sink: &dyn LineSink, deadline: Instant) -> bool {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(line) => sink.line(&line),
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

/// Forward lines from a pipe into the channel, decoding invalid UTF-8 lossily.
fn spawn_line_reader<R>(pipe: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
