//! Command implementations

pub mod boards;
pub mod build;
pub mod completions;
pub mod core;
pub mod doctor;
pub mod lib;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use iecport::ops::{resolve_config, Overrides};
use iecport::util::config::Config;
use iecport::util::shell::Shell;
use iecport::util::GlobalContext;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub verbose: bool,
    pub quiet: bool,
    pub no_color: bool,
    pub root: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

impl GlobalOpts {
    /// Shell honoring the output flags.
    pub fn shell(&self, json: bool) -> Arc<Shell> {
        Arc::new(Shell::from_flags(self.quiet, self.verbose, self.no_color, json))
    }

    /// Overrides carrying the global path flags.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            catalog: self.catalog.clone(),
            ..Default::default()
        }
    }

    /// Configuration with only the global flags applied.
    pub fn config(&self) -> Result<(GlobalContext, Config)> {
        let mut gctx = GlobalContext::new()?;
        gctx.set_verbose(self.verbose);
        let config = resolve_config(&gctx, &self.overrides());
        Ok((gctx, config))
    }
}
