//! Implementation of `iecport build`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::builder::{
    BuildContext, BuildError, BuildObserver, BuildPipeline, BuildReport, BuildRequest,
    SettleDelays,
};
use crate::core::{CachePolicy, HalCatalog};
use crate::util::config::Config;
use crate::util::log::OutputSink;
use crate::util::process::ProcessRunner;
use crate::util::GlobalContext;

/// Command line values that take precedence over configuration files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Installation root
    pub root: Option<PathBuf>,

    /// Board catalog path
    pub catalog: Option<PathBuf>,

    /// Cache policy
    pub policy: Option<CachePolicy>,

    /// Timeout for streamed commands
    pub timeout: Option<Duration>,

    /// Skip the settle delays between phases
    pub no_settle: bool,
}

/// Load configuration and apply command line overrides.
///
/// Relative paths are resolved against the working directory of `gctx`.
pub fn resolve_config(gctx: &GlobalContext, overrides: &Overrides) -> Config {
    let mut config = gctx.load_config();

    if let Some(root) = &overrides.root {
        config.paths.root = Some(root.clone());
    }
    if let Some(catalog) = &overrides.catalog {
        config.paths.hals = Some(catalog.clone());
    }
    if let Some(policy) = overrides.policy {
        config.build.policy = Some(policy);
    }
    if let Some(timeout) = overrides.timeout {
        config.build.timeout_secs = Some(timeout.as_secs());
    }
    if overrides.no_settle {
        config.build.settle = Some(false);
    }

    config.paths.root = Some(gctx.resolve(&config.root()));
    config.paths.cli = config.paths.cli.as_deref().map(|p| gctx.resolve(p));
    config.paths.transpiler = config.paths.transpiler.as_deref().map(|p| gctx.resolve(p));
    config.paths.hals = config.paths.hals.as_deref().map(|p| gctx.resolve(p));
    config
}

/// Build context for operations that only talk to the board manager.
pub fn tool_context(config: &Config) -> anyhow::Result<BuildContext> {
    BuildContext::from_config(config, BuildRequest::default().with_policy(config.policy()))
}

/// Path of the board catalog for `config`.
pub fn catalog_path(config: &Config, ctx: &BuildContext) -> PathBuf {
    config
        .paths
        .hals
        .clone()
        .unwrap_or_else(|| ctx.layout.catalog_path())
}

/// Load the board catalog for `config`.
pub fn load_catalog(config: &Config) -> anyhow::Result<(PathBuf, HalCatalog)> {
    let ctx = tool_context(config)?;
    let path = catalog_path(config, &ctx);
    let catalog = HalCatalog::load(&path)?;
    Ok((path, catalog))
}

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Board display name from the catalog
    pub board: String,

    /// Structured text program
    pub program: PathBuf,

    /// Lines for `defines.h`
    pub definitions: Vec<String>,

    /// Optional sketch header
    pub sketch: Option<PathBuf>,

    /// Upload to this port after compiling
    pub port: Option<String>,
}

fn read_input(gctx: &GlobalContext, path: &Path) -> Result<String, BuildError> {
    let path = gctx.resolve(path);
    std::fs::read_to_string(&path).map_err(|e| BuildError::io(path, e))
}

/// Run a complete build for one board.
///
/// The catalog is written back when the build installed or upgraded the core,
/// whether or not the build succeeded.
pub fn build(
    gctx: &GlobalContext,
    config: &Config,
    options: &BuildOptions,
    runner: &dyn ProcessRunner,
    sink: &dyn OutputSink,
    observer: &dyn BuildObserver,
) -> Result<BuildReport, BuildError> {
    let program = read_input(gctx, &options.program)?;
    let sketch = options
        .sketch
        .as_deref()
        .map(|path| read_input(gctx, path))
        .transpose()?;

    let mut request = BuildRequest::new(program)
        .with_policy(config.policy())
        .with_definitions(options.definitions.iter().cloned());
    if let Some(sketch) = sketch {
        request = request.with_sketch(sketch);
    }
    if let Some(port) = &options.port {
        request = request.with_port(port.clone());
    }

    let mut ctx = BuildContext::from_config(config, request)?;
    if !config.settle() {
        ctx = ctx.with_settle(SettleDelays::NONE);
    }
    tracing::debug!("build context: {:?}", ctx);

    let catalog_path = catalog_path(config, &ctx);
    let mut catalog = HalCatalog::load(&catalog_path)?;
    let mut board = catalog.board(&options.board)?.clone();
    board
        .validate()
        .with_context(|| format!("invalid catalog entry for `{}`", options.board))?;

    let original = board.clone();
    let result = BuildPipeline::standard().run(&ctx, runner, sink, observer, &mut board);

    // Core bookkeeping is kept even when a later phase fails.
    if board != original {
        if let Some(entry) = catalog.get_mut(&options.board) {
            *entry = board;
        }
        if let Err(e) = catalog.save(&catalog_path) {
            tracing::warn!("failed to record core update: {:#}", e);
        }
    }

    result
}
