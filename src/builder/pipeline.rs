//! Ordered build phases.
//!
//! A build is a fixed list of [`Phase`]s run one after another against a
//! shared [`Session`]. The first failing phase stops the build; nothing is
//! rolled back; the next build's first phase clears stale outputs.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::context::BuildContext;
use super::error::BuildError;
use super::events::{BuildEvent, BuildObserver};
use super::phases;
use crate::core::board::BoardHal;
use crate::toolchain::ToolCli;
use crate::util::log::{BuildLog, OutputSink};
use crate::util::process::{ProcessBuilder, ProcessRunner, RunStatus};

/// Read-only services available to every phase.
pub struct Session<'a> {
    pub ctx: &'a BuildContext,
    pub cli: ToolCli<'a>,
}

impl<'a> Session<'a> {
    /// Create a session over an already configured tool handle.
    pub fn new(ctx: &'a BuildContext, cli: ToolCli<'a>) -> Self {
        Session { ctx, cli }
    }

    /// The build log.
    pub fn log(&self) -> &'a BuildLog<'a> {
        self.cli.log()
    }

    /// The process runner.
    pub fn runner(&self) -> &'a dyn ProcessRunner {
        self.cli.runner()
    }

    /// Run a board manager subcommand, turning timeouts into errors.
    pub fn run_tool<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<RunStatus, BuildError> {
        let status = self.cli.run(args)?;
        if status == RunStatus::TimedOut {
            return Err(BuildError::Timeout {
                command: display_args(args),
            });
        }
        Ok(status)
    }

    /// Run an arbitrary command through the runner, streaming into the log.
    pub fn run_command(&self, cmd: &ProcessBuilder) -> Result<RunStatus, BuildError> {
        let status = self.runner().stream(cmd, self.log(), self.ctx.timeout)?;
        if status == RunStatus::TimedOut {
            return Err(BuildError::Timeout {
                command: cmd.display_command(),
            });
        }
        Ok(status)
    }

    /// Wait for the filesystem to settle.
    pub fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

fn display_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mutable state carried from phase to phase.
pub struct BuildState<'b> {
    /// Board being built for; core bookkeeping is written here
    pub board: &'b mut BoardHal,

    /// Whether a core install or upgrade happened
    pub core_updated: bool,

    /// Output directory reported when nothing was uploaded
    pub output_dir: Option<PathBuf>,

    /// Port the program was uploaded to
    pub uploaded_to: Option<String>,
}

impl<'b> BuildState<'b> {
    /// Fresh state for `board`.
    pub fn new(board: &'b mut BoardHal) -> Self {
        BuildState {
            board,
            core_updated: false,
            output_dir: None,
            uploaded_to: None,
        }
    }
}

/// One step of the build.
pub trait Phase {
    /// Stable kebab-case name used in events and logs.
    fn name(&self) -> &'static str;

    /// Run the phase.
    fn run(&self, session: &Session<'_>, state: &mut BuildState<'_>) -> Result<(), BuildError>;
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Phases that ran, in order
    pub phases: Vec<&'static str>,

    /// Output directory, when nothing was uploaded
    pub output_dir: Option<PathBuf>,

    /// Port the program was uploaded to
    pub port: Option<String>,

    /// Whether the core was installed or upgraded
    pub core_updated: bool,

    /// Installed core version recorded on the board
    pub core_version: Option<String>,

    /// Wall-clock duration of the build
    pub elapsed: Duration,
}

/// The ordered list of phases.
pub struct BuildPipeline {
    phases: Vec<Box<dyn Phase>>,
}

impl BuildPipeline {
    /// Create a pipeline from explicit phases.
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        BuildPipeline { phases }
    }

    /// The standard fourteen phase build.
    pub fn standard() -> Self {
        BuildPipeline::new(vec![
            Box::new(phases::PrepareWorkspace),
            Box::new(phases::VerifyToolchain),
            Box::new(phases::ProvisionCore),
            Box::new(phases::InstallLibraries),
            Box::new(phases::MaintainLibraries),
            Box::new(phases::Transpile),
            Box::new(phases::StageHal),
            Box::new(phases::WriteDefinitions),
            Box::new(phases::WriteSketch),
            Box::new(phases::GenerateGlue),
            Box::new(phases::PatchSources),
            Box::new(phases::Compile),
            Box::new(phases::UploadOrReport),
            Box::new(phases::Finalize::default()),
        ])
    }

    /// Phase names in run order.
    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Number of phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Whether the pipeline has no phases.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Run every phase for `board`.
    ///
    /// Log lines go to `build.log` and `sink`; progress goes to `observer`.
    /// On success the board carries the updated core bookkeeping.
    pub fn run(
        &self,
        ctx: &BuildContext,
        runner: &dyn ProcessRunner,
        sink: &dyn OutputSink,
        observer: &dyn BuildObserver,
        board: &mut BoardHal,
    ) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let log = BuildLog::new(ctx.layout.log_path(), sink);
        let cli = ToolCli::new(&ctx.cli, runner, &log).with_timeout(ctx.timeout);
        let session = Session::new(ctx, cli);
        let mut state = BuildState::new(board);

        let total = self.phases.len();
        let mut completed = Vec::with_capacity(total);

        for (i, phase) in self.phases.iter().enumerate() {
            tracing::debug!("phase {}/{}: {}", i + 1, total, phase.name());
            observer.on_event(&BuildEvent::started(i + 1, total, phase.name()));
            let phase_start = Instant::now();

            if let Err(err) = phase.run(&session, &mut state) {
                tracing::debug!("phase {} failed: {}", phase.name(), err);
                log.message(format!("Build failed in {}: {}", phase.name(), err));
                observer.on_event(&BuildEvent::failed(
                    millis(start.elapsed()),
                    phase.name(),
                    err.to_string(),
                ));
                return Err(err);
            }

            observer.on_event(&BuildEvent::phase_finished(
                phase.name(),
                millis(phase_start.elapsed()),
            ));
            completed.push(phase.name());
        }

        let report = BuildReport {
            phases: completed,
            output_dir: state.output_dir.take(),
            port: state.uploaded_to.take(),
            core_updated: state.core_updated,
            core_version: state.board.version.clone(),
            elapsed: start.elapsed(),
        };
        observer.on_event(&BuildEvent::succeeded(
            millis(report.elapsed),
            report.output_dir.clone(),
            report.port.clone(),
        ));
        Ok(report)
    }
}

impl Default for BuildPipeline {
    fn default() -> Self {
        BuildPipeline::standard()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
