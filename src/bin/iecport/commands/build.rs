//! `iecport build` command

use std::time::Duration;

use anyhow::Result;

use crate::cli::{BuildArgs, MessageFormat};
use crate::commands::GlobalOpts;
use iecport::builder::{BuildEvent, BuildPipeline};
use iecport::ops::{build, resolve_config, tool_context, BuildOptions, Overrides};
use iecport::util::shell::Status;
use iecport::util::{GlobalContext, SystemRunner};

pub fn execute(args: BuildArgs, global: &GlobalOpts) -> Result<()> {
    let shell = global.shell(args.message_format == MessageFormat::Json);

    let mut gctx = GlobalContext::new()?;
    gctx.set_verbose(global.verbose);

    // CLI flags override configuration
    let overrides = Overrides {
        policy: args.policy,
        timeout: args.timeout.map(Duration::from_secs),
        no_settle: args.no_settle,
        ..global.overrides()
    };
    let config = resolve_config(&gctx, &overrides);

    let options = BuildOptions {
        board: args.board,
        program: args.program,
        definitions: args.defines,
        sketch: args.sketch,
        port: args.port,
    };

    shell.status(
        Status::Building,
        format!(
            "{} for {} (policy {})",
            options.program.display(),
            options.board,
            config.policy()
        ),
    );

    let progress = shell.progress(BuildPipeline::standard().len() as u64, "Building");
    let observer = |event: &BuildEvent| {
        shell.json_event(event);
        match event {
            BuildEvent::PhaseStarted { phase, .. } => progress.set_message(phase),
            BuildEvent::PhaseFinished { .. } => progress.inc(1),
            BuildEvent::BuildFinished { .. } => progress.finish(),
        }
    };

    let result = build(
        &gctx,
        &config,
        &options,
        &SystemRunner,
        shell.as_ref(),
        &observer,
    );
    progress.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Ok(ctx) = tool_context(&config) {
                shell.note(format!(
                    "see {} for the full build output",
                    ctx.layout.log_path().display()
                ));
            }
            return Err(e.into());
        }
    };

    if report.core_updated {
        shell.status(
            Status::Updated,
            format!(
                "core recorded at version {}",
                report.core_version.as_deref().unwrap_or("unknown")
            ),
        );
    }
    if let Some(port) = &report.port {
        shell.status(Status::Uploaded, format!("to {}", port));
    }
    if let Some(dir) = &report.output_dir {
        shell.status(Status::Info, format!("binaries in {}", dir.display()));
    }
    shell.status(
        Status::Finished,
        format!("build in {:.2}s", report.elapsed.as_secs_f64()),
    );

    Ok(())
}
