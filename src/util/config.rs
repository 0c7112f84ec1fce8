//! Configuration file support for iecport.
//!
//! iecport supports two configuration file locations:
//! - Global: `~/.iecport/config.toml` - User-wide defaults
//! - Project: `.iecport/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command line
//! flags take precedence over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::libraries::RequiredLibraries;
use crate::core::policy::CachePolicy;
use crate::toolchain::platform::DEFAULT_BUILTIN_CORE_PATTERN;

/// Installation root used when nothing else is configured.
pub const DEFAULT_ROOT: &str = "editor/arduino";

/// Extra compiler flags per core id, used unless configured otherwise.
pub const DEFAULT_EXTRA_FLAGS: &[(&str, &str)] = &[("esp32:esp32", "-MMD -c")];

/// iecport configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Installation paths
    pub paths: PathsConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Library settings
    pub libraries: LibrariesConfig,

    /// Core settings
    pub cores: CoresConfig,
}

/// Where the toolchain and board files live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Installation root containing `bin/`, `src/` and `examples/`
    pub root: Option<PathBuf>,

    /// Board manager executable, overriding `<root>/bin/arduino-cli-*`
    pub cli: Option<PathBuf>,

    /// Transpiler executable, overriding `<root>/bin/iec2c*`
    pub transpiler: Option<PathBuf>,

    /// Board catalog, overriding `<root>/src/hals.json`
    pub hals: Option<PathBuf>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default cache policy
    pub policy: Option<CachePolicy>,

    /// Kill streamed commands after this many seconds
    pub timeout_secs: Option<u64>,

    /// Wait for files to settle between phases (default true)
    pub settle: Option<bool>,
}

/// Library-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrariesConfig {
    /// Libraries to install before compiling, replacing the built-in list
    pub required: Option<Vec<String>>,
}

/// Core-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoresConfig {
    /// Cores matching this regex need no board manager URL
    pub builtin_pattern: Option<String>,

    /// Extra compiler flags keyed by core id
    pub extra_flags: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Paths
        if other.paths.root.is_some() {
            self.paths.root = other.paths.root;
        }
        if other.paths.cli.is_some() {
            self.paths.cli = other.paths.cli;
        }
        if other.paths.transpiler.is_some() {
            self.paths.transpiler = other.paths.transpiler;
        }
        if other.paths.hals.is_some() {
            self.paths.hals = other.paths.hals;
        }

        // Build settings
        if other.build.policy.is_some() {
            self.build.policy = other.build.policy;
        }
        if other.build.timeout_secs.is_some() {
            self.build.timeout_secs = other.build.timeout_secs;
        }
        if other.build.settle.is_some() {
            self.build.settle = other.build.settle;
        }

        // Libraries replace, they are not unioned
        if other.libraries.required.is_some() {
            self.libraries.required = other.libraries.required;
        }

        // Cores
        if other.cores.builtin_pattern.is_some() {
            self.cores.builtin_pattern = other.cores.builtin_pattern;
        }
        self.cores.extra_flags.extend(other.cores.extra_flags);
    }

    /// Installation root.
    pub fn root(&self) -> PathBuf {
        self.paths
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
    }

    /// Default cache policy.
    pub fn policy(&self) -> CachePolicy {
        self.build.policy.unwrap_or_default()
    }

    /// Timeout for streamed commands.
    pub fn timeout(&self) -> Option<Duration> {
        self.build
            .timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Whether settle delays are enabled.
    pub fn settle(&self) -> bool {
        self.build.settle.unwrap_or(true)
    }

    /// Libraries required before compiling.
    pub fn required_libraries(&self) -> RequiredLibraries {
        match &self.libraries.required {
            Some(names) => RequiredLibraries::new(names.iter().cloned()),
            None => RequiredLibraries::default(),
        }
    }

    /// Compiled built-in core pattern.
    pub fn builtin_pattern(&self) -> Result<Regex> {
        let pattern = self
            .cores
            .builtin_pattern
            .as_deref()
            .unwrap_or(DEFAULT_BUILTIN_CORE_PATTERN);
        Regex::new(pattern).with_context(|| format!("invalid builtin_pattern `{}`", pattern))
    }

    /// Extra compiler flags per core, defaults overlaid with configured values.
    pub fn extra_flags(&self) -> BTreeMap<String, String> {
        let mut flags: BTreeMap<String, String> = DEFAULT_EXTRA_FLAGS
            .iter()
            .map(|(core, flags)| (core.to_string(), flags.to_string()))
            .collect();
        flags.extend(self.cores.extra_flags.clone());
        flags
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.iecport/config.toml)
/// 2. Global config (~/.iecport/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    // Load global config first
    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

/// Get the project config path (.iecport/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".iecport").join("config.toml")
}
