//! Platform core installation.
//!
//! A core moves through three states: not installed, installed with an
//! update available, and up to date. [`CoreManager::check_status`] reports
//! the state; [`CoreManager::reinstall`] and [`CoreManager::upgrade`] move it
//! to up to date. Updates are applied by uninstalling and installing again
//! rather than upgrading in place, which has proven more reliable for cores.

use regex::Regex;
use thiserror::Error;

use super::query::contains_platform;
use super::ToolCli;
use crate::core::board::BoardHal;

/// Cores matching this pattern ship with the board manager's default index.
pub const DEFAULT_BUILTIN_CORE_PATTERN: &str = "^arduino:";

/// Core operation failure.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("core installation of `{0}` failed")]
    InstallFailed(String),

    #[error("core upgrade of `{0}` failed")]
    UpgradeFailed(String),
}

/// Installation state of a core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreStatus {
    UpToDate,
    NotInstalled,
    UpdateAvailable,
    /// The status could not be determined; the message says why.
    Error,
}

impl CoreStatus {
    /// Numeric status code.
    ///
    /// [`CoreStatus::Error`] shares code 2 with [`CoreStatus::UpdateAvailable`]:
    /// both mean the core should be reinstalled.
    pub fn code(&self) -> u8 {
        match self {
            CoreStatus::UpToDate => 0,
            CoreStatus::NotInstalled => 1,
            CoreStatus::UpdateAvailable | CoreStatus::Error => 2,
        }
    }

    /// Whether the core needs any install or upgrade work.
    pub fn needs_action(&self) -> bool {
        *self != CoreStatus::UpToDate
    }
}

/// Installs and upgrades platform cores.
pub struct CoreManager<'a> {
    cli: &'a ToolCli<'a>,
    builtin: Regex,
}

impl<'a> CoreManager<'a> {
    /// Create a manager using the default built-in core pattern.
    pub fn new(cli: &'a ToolCli<'a>) -> Self {
        CoreManager {
            cli,
            builtin: default_builtin_pattern(),
        }
    }

    /// Use a custom pattern for cores that need no board manager URL.
    pub fn with_builtin_pattern(mut self, pattern: Regex) -> Self {
        self.builtin = pattern;
        self
    }

    /// Determine the installation state of `core`.
    ///
    /// Refreshes the core index first. Any query failure yields
    /// [`CoreStatus::Error`] with the cause in the message.
    pub fn check_status(&self, core: &str) -> (CoreStatus, String) {
        let query = self.cli.query();

        if let Err(e) = query.update_core_index() {
            return (CoreStatus::Error, format!("Error updating core index: {}", e));
        }

        let installed = match query.installed_platforms() {
            Ok(platforms) => platforms,
            Err(e) => return (CoreStatus::Error, format!("Error checking core: {}", e)),
        };
        if !contains_platform(&installed, core) {
            return (
                CoreStatus::NotInstalled,
                format!("Core {} is not installed", core),
            );
        }

        match query.updatable_platforms() {
            Ok(updatable) if contains_platform(&updatable, core) => (
                CoreStatus::UpdateAvailable,
                format!("Updates found for {}", core),
            ),
            Ok(_) => (
                CoreStatus::UpToDate,
                format!("No updates available for {}", core),
            ),
            Err(e) => (CoreStatus::Error, format!("Error checking core: {}", e)),
        }
    }

    /// Installed version of `core`, if it is installed.
    pub fn installed_version(&self, core: &str) -> Option<String> {
        match self.cli.query().installed_platforms() {
            Ok(platforms) => platforms
                .into_iter()
                .find(|p| p.id.as_deref() == Some(core))
                .and_then(|p| p.installed_version),
            Err(e) => {
                tracing::warn!("failed to read installed version of {}: {}", core, e);
                None
            }
        }
    }

    /// Remove `core` if present, then install it.
    pub fn reinstall(&self, core: &str) -> Result<String, CoreError> {
        self.cli.run_ok(["core", "update-index"]);

        let installed = match self.cli.query().installed_platforms() {
            Ok(platforms) => contains_platform(&platforms, core),
            Err(e) => {
                tracing::warn!("core list failed, assuming {} is installed: {}", core, e);
                true
            }
        };
        if installed {
            // May fail on a half-installed core; the install below decides.
            self.cli.run_ok(["core", "uninstall", core]);
        }

        if !self.cli.run_ok(["core", "install", core]) {
            return Err(CoreError::InstallFailed(core.to_string()));
        }
        Ok("Core reinstallation completed.".to_string())
    }

    /// Bring `core` up to date.
    ///
    /// When the status cannot be determined the core is only installed,
    /// never removed, and an install failure is tolerated while the core is
    /// still present.
    pub fn upgrade(&self, core: &str) -> Result<String, CoreError> {
        let (status, message) = self.check_status(core);
        self.cli.log().message(&message);

        match status {
            CoreStatus::UpToDate => {
                // The index refresh may have published a release after all.
                let listed = self
                    .cli
                    .query()
                    .updatable_platforms()
                    .map(|p| contains_platform(&p, core))
                    .unwrap_or(false);
                if !listed {
                    return Ok("No action needed".to_string());
                }
                if !self.cli.run_ok(["core", "upgrade", core]) {
                    return Err(CoreError::UpgradeFailed(core.to_string()));
                }
                Ok("Upgrade successful.".to_string())
            }
            CoreStatus::NotInstalled | CoreStatus::UpdateAvailable => self.reinstall(core),
            CoreStatus::Error => self.install_keeping_existing(core, &message),
        }
    }

    fn install_keeping_existing(&self, core: &str, cause: &str) -> Result<String, CoreError> {
        if self.cli.run_ok(["core", "install", core]) {
            return Ok("Core installation completed.".to_string());
        }

        let present = self
            .cli
            .query()
            .installed_platforms()
            .map(|p| contains_platform(&p, core))
            .unwrap_or(false);
        if !present {
            return Err(CoreError::InstallFailed(core.to_string()));
        }
        tracing::warn!("keeping installed {}: {}", core, cause);
        Ok(format!("Keeping installed {}", core))
    }

    /// Whether the board's core needs its board manager URL registered.
    ///
    /// A declared URL must appear in the manager's configuration; failing to
    /// read the configuration counts as missing. Without a declared URL, only
    /// built-in cores are considered set up.
    pub fn needs_board_setup(&self, board: &BoardHal) -> bool {
        match board.board_manager_url() {
            Some(url) => match self.cli.query().board_manager_urls() {
                Ok(urls) => !urls.iter().any(|u| u == url),
                Err(e) => {
                    tracing::warn!("failed to read board manager URLs: {}", e);
                    true
                }
            },
            None => !self.builtin.is_match(&board.core),
        }
    }
}

/// Compiled [`DEFAULT_BUILTIN_CORE_PATTERN`].
pub fn default_builtin_pattern() -> Regex {
    Regex::new(DEFAULT_BUILTIN_CORE_PATTERN).expect("built-in core pattern is valid")
}
