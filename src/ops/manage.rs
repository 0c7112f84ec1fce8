//! Direct access to the library and core managers.
//!
//! These back the `iecport core` and `iecport lib` subcommands. Output of the
//! board manager goes to `build.log` and the given sink, as during a build.

use crate::builder::{BuildContext, BuildError};
use crate::toolchain::{CoreManager, CoreStatus, LibraryManager, LibraryStatus, ToolCli};
use crate::util::log::{BuildLog, OutputSink};
use crate::util::process::ProcessRunner;

/// Run `f` with a board manager handle for `ctx`.
pub fn with_tool<T>(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
    f: impl FnOnce(&ToolCli<'_>) -> Result<T, BuildError>,
) -> Result<T, BuildError> {
    if !ctx.cli.is_file() {
        return Err(BuildError::ToolMissing {
            tool: "arduino-cli".to_string(),
            path: ctx.cli.clone(),
        });
    }
    let log = BuildLog::new(ctx.layout.log_path(), sink);
    let cli = ToolCli::new(&ctx.cli, runner, &log).with_timeout(ctx.timeout);
    f(&cli)
}

fn cores<'a>(ctx: &BuildContext, cli: &'a ToolCli<'a>) -> CoreManager<'a> {
    CoreManager::new(cli).with_builtin_pattern(ctx.builtin_cores.clone())
}

/// Installation state of a core.
pub fn core_status(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
    core: &str,
) -> Result<(CoreStatus, String), BuildError> {
    with_tool(ctx, runner, sink, |cli| Ok(cores(ctx, cli).check_status(core)))
}

/// Bring a core up to date.
pub fn core_upgrade(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
    core: &str,
) -> Result<String, BuildError> {
    with_tool(ctx, runner, sink, |cli| Ok(cores(ctx, cli).upgrade(core)?))
}

/// Remove and install a core.
pub fn core_reinstall(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
    core: &str,
) -> Result<String, BuildError> {
    with_tool(ctx, runner, sink, |cli| Ok(cores(ctx, cli).reinstall(core)?))
}

/// Whether installed libraries have updates.
pub fn lib_status(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
) -> Result<(LibraryStatus, String), BuildError> {
    with_tool(ctx, runner, sink, |cli| {
        Ok(LibraryManager::new(cli).check_updatable())
    })
}

/// Install missing required libraries.
pub fn lib_install(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
) -> Result<(), BuildError> {
    with_tool(ctx, runner, sink, |cli| {
        Ok(LibraryManager::new(cli).ensure_installed(&ctx.required_libraries)?)
    })
}

/// Upgrade every outdated library.
pub fn lib_upgrade(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
) -> Result<String, BuildError> {
    with_tool(ctx, runner, sink, |cli| {
        Ok(LibraryManager::new(cli).upgrade_all()?)
    })
}

/// Uninstall and reinstall installed and required libraries.
pub fn lib_clean(
    ctx: &BuildContext,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
) -> Result<(), BuildError> {
    with_tool(ctx, runner, sink, |cli| {
        Ok(LibraryManager::new(cli).clean_reinstall(&ctx.required_libraries)?)
    })
}
