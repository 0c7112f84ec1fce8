//! Build cache policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How aggressively a build refreshes cached toolchain state.
///
/// Levels are ordered: each level performs everything the levels below it
/// do. Phases compare with `>=` against the level that unlocks an action.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Reuse everything that is already installed and compiled.
    #[default]
    UseCache,
    /// Pass `--clean` to the compiler.
    CleanBuild,
    /// Upgrade the board core even if it reports no update.
    UpgradeCore,
    /// Upgrade all installed libraries.
    UpgradeLibs,
    /// Uninstall and reinstall every library.
    CleanLibs,
    /// Clear the download cache and reinstall the core from scratch.
    MrProper,
}

impl CachePolicy {
    /// All policies in ascending order.
    pub const ALL: [CachePolicy; 6] = [
        CachePolicy::UseCache,
        CachePolicy::CleanBuild,
        CachePolicy::UpgradeCore,
        CachePolicy::UpgradeLibs,
        CachePolicy::CleanLibs,
        CachePolicy::MrProper,
    ];

    /// Kebab-case name used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::UseCache => "use-cache",
            CachePolicy::CleanBuild => "clean-build",
            CachePolicy::UpgradeCore => "upgrade-core",
            CachePolicy::UpgradeLibs => "upgrade-libs",
            CachePolicy::CleanLibs => "clean-libs",
            CachePolicy::MrProper => "mr-proper",
        }
    }

    /// Whether the compiler should discard its object cache.
    pub fn clean_build(&self) -> bool {
        *self >= CachePolicy::CleanBuild
    }

    /// Whether the core is upgraded regardless of its reported status.
    pub fn force_core_upgrade(&self) -> bool {
        *self >= CachePolicy::UpgradeCore
    }

    /// Whether installed libraries are upgraded.
    pub fn upgrade_libraries(&self) -> bool {
        *self >= CachePolicy::UpgradeLibs
    }

    /// Whether libraries are uninstalled and reinstalled.
    pub fn clean_libraries(&self) -> bool {
        *self >= CachePolicy::CleanLibs
    }

    /// Whether the core is reinstalled from a clean download cache.
    pub fn full_core_reinstall(&self) -> bool {
        *self >= CachePolicy::MrProper
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        CachePolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "invalid cache policy '{}'; expected one of: {}",
                    s,
                    CachePolicy::ALL.map(|p| p.as_str()).join(", ")
                )
            })
    }
}
