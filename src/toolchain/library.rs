//! Library installation and maintenance.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{QueryError, ToolCli};
use crate::core::libraries::RequiredLibraries;

/// Library operation failure.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to install library `{0}`")]
    InstallFailed(String),

    #[error("{} still missing after installation: {}", plural(.0.len(), "library", "libraries"), join_names(.0))]
    StillMissing(BTreeSet<String>),

    #[error("library upgrade failed")]
    UpgradeFailed,

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result of checking installed libraries for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryStatus {
    UpToDate,
    UpdatesAvailable,
    Error,
}

impl LibraryStatus {
    /// Numeric status code (0 = up to date, 1 = updates, 2 = error).
    pub fn code(&self) -> u8 {
        match self {
            LibraryStatus::UpToDate => 0,
            LibraryStatus::UpdatesAvailable => 1,
            LibraryStatus::Error => 2,
        }
    }
}

/// `1 library`, `2 libraries`.
fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Installs and maintains the libraries a build needs.
pub struct LibraryManager<'a> {
    cli: &'a ToolCli<'a>,
}

impl<'a> LibraryManager<'a> {
    /// Create a manager using `cli`.
    pub fn new(cli: &'a ToolCli<'a>) -> Self {
        LibraryManager { cli }
    }

    /// Names from `required` that are not installed.
    ///
    /// If the installed list cannot be queried every required library is
    /// reported missing; reinstalling is cheaper than a broken build.
    pub fn find_missing(&self, required: &RequiredLibraries) -> BTreeSet<String> {
        match self.cli.query().installed_library_names() {
            Ok(installed) => required.as_set().difference(&installed).cloned().collect(),
            Err(e) => {
                tracing::warn!("library query failed, assuming all missing: {}", e);
                self.cli
                    .log()
                    .message(format!("Error checking libraries: {}", e));
                required.as_set().clone()
            }
        }
    }

    /// Install whatever is missing from `required`.
    ///
    /// Does nothing, not even an index update, when all libraries are present.
    pub fn ensure_installed(&self, required: &RequiredLibraries) -> Result<(), LibraryError> {
        let log = self.cli.log();
        log.message("Checking required libraries...");

        let missing = self.find_missing(required);
        if missing.is_empty() {
            log.message("All required libraries are already installed.");
            return Ok(());
        }

        if !self.cli.run_ok(["lib", "update-index"]) {
            log.message("Library index update failed, trying installation anyway");
        }

        log.message(format!(
            "Installing {} missing {}",
            missing.len(),
            if missing.len() == 1 { "library" } else { "libraries" }
        ));
        for (i, lib) in missing.iter().enumerate() {
            log.message(format!(
                "Installing library {} ({}/{})",
                lib,
                i + 1,
                missing.len()
            ));
            if !self.cli.run_ok(["lib", "install", lib.as_str()]) {
                log.message(format!("Error installing library {}", lib));
            }
        }

        let still_missing = self.find_missing(required);
        if !still_missing.is_empty() {
            log.message(format!(
                "Failed to install {}: {}",
                plural(still_missing.len(), "library", "libraries"),
                join_names(&still_missing)
            ));
            return Err(LibraryError::StillMissing(still_missing));
        }

        log.message("All required libraries have been successfully installed.");
        Ok(())
    }

    /// Check whether installed libraries have updates.
    pub fn check_updatable(&self) -> (LibraryStatus, String) {
        match self.cli.query().updatable_libraries() {
            Ok(libs) if libs.is_empty() => (
                LibraryStatus::UpToDate,
                "All libraries are up to date".to_string(),
            ),
            Ok(libs) => {
                let message = if libs.len() == 1 {
                    "Update available for 1 library".to_string()
                } else {
                    format!("Updates available for {} libraries", libs.len())
                };
                (LibraryStatus::UpdatesAvailable, message)
            }
            Err(e) => (
                LibraryStatus::Error,
                format!("Error checking libraries: {}", e),
            ),
        }
    }

    /// Upgrade every outdated library.
    pub fn upgrade_all(&self) -> Result<String, LibraryError> {
        self.cli.run_ok(["lib", "update-index"]);

        let (status, message) = self.check_updatable();
        match status {
            LibraryStatus::UpToDate => return Ok(message),
            LibraryStatus::Error => return Err(LibraryError::Query(QueryError::Tool(message))),
            LibraryStatus::UpdatesAvailable => {}
        }

        if !self.cli.run_ok(["lib", "upgrade"]) {
            return Err(LibraryError::UpgradeFailed);
        }
        Ok("Libraries upgrade completed.".to_string())
    }

    /// Uninstall and reinstall every installed and required library.
    ///
    /// The set of installed libraries stays the same; only their versions are
    /// normalized. Uninstall failures are ignored because the library may not
    /// have been installed. The first install failure aborts.
    pub fn clean_reinstall(&self, required: &RequiredLibraries) -> Result<(), LibraryError> {
        let log = self.cli.log();
        log.message("Cleaning libraries...");

        let installed = match self.cli.query().installed_library_names() {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("library query failed during clean: {}", e);
                BTreeSet::new()
            }
        };
        let all: BTreeSet<String> = installed.union(required.as_set()).cloned().collect();

        log.message(format!("Processing {}", plural(all.len(), "library", "libraries")));
        for lib in &all {
            log.message(format!("Processing library: {}", lib));
            self.cli.run_ok(["lib", "uninstall", lib.as_str()]);
            if !self.cli.run_ok(["lib", "install", lib.as_str()]) {
                log.message(format!("LIBRARIES INSTALLATION FAILED: {}", lib));
                return Err(LibraryError::InstallFailed(lib.clone()));
            }
        }

        Ok(())
    }
}
