//! Build context - installation layout, tool paths and build request.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::libraries::RequiredLibraries;
use crate::core::policy::CachePolicy;
use crate::toolchain::platform::default_builtin_pattern;
use crate::util::config::Config;

/// Files the transpiler produces. Removed before every build.
pub const TRANSPILER_OUTPUTS: &[&str] = &[
    "POUS.c",
    "POUS.h",
    "LOCATED_VARIABLES.h",
    "VARIABLES.csv",
    "Config0.c",
    "Config0.h",
    "Res0.c",
];

/// Board manager executable name for the host OS.
pub fn cli_binary_name() -> &'static str {
    if cfg!(windows) {
        "arduino-cli-w64.exe"
    } else if cfg!(target_os = "macos") {
        "arduino-cli-mac"
    } else {
        "arduino-cli-l64"
    }
}

/// Transpiler executable name for the host OS.
pub fn transpiler_binary_name() -> &'static str {
    if cfg!(windows) {
        "iec2c.exe"
    } else if cfg!(target_os = "macos") {
        "iec2c_mac"
    } else {
        "iec2c"
    }
}

/// Directory layout of an installation.
///
/// ```text
/// <root>/
///   bin/                       tool binaries
///   src/                       working directory of the transpiler
///     hal/                     per-board HAL sources
///     lib/                     runtime headers
///     build.log
///     hals.json
///   examples/Baremetal/        sketch compiled for every build
///     build/                   exported binaries
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`, taken as given.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Layout { root: root.into() }
    }

    /// Layout rooted at `root`, resolved against the current directory.
    pub fn resolve(root: &Path) -> Result<Self> {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .context("failed to get current directory")?
                .join(root)
        };
        Ok(Layout::new(root))
    }

    /// Installation root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tool binaries.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Working directory of the transpiler and home of generated sources.
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    /// Per-board HAL sources.
    pub fn hal_dir(&self) -> PathBuf {
        self.src_dir().join("hal")
    }

    /// Runtime headers passed to the compiler with `-I`.
    pub fn lib_include_dir(&self) -> PathBuf {
        self.src_dir().join("lib")
    }

    /// Build log.
    pub fn log_path(&self) -> PathBuf {
        self.src_dir().join("build.log")
    }

    /// Default board catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.src_dir().join("hals.json")
    }

    /// Sketch directory.
    pub fn sketch_dir(&self) -> PathBuf {
        self.root.join("examples").join("Baremetal")
    }

    /// Sketch file passed to `compile`.
    pub fn sketch_path(&self) -> PathBuf {
        self.sketch_dir().join("Baremetal.ino")
    }

    /// Where exported binaries end up.
    pub fn output_dir(&self) -> PathBuf {
        self.sketch_dir().join("build")
    }

    /// Default board manager executable.
    pub fn default_cli(&self) -> PathBuf {
        self.bin_dir().join(cli_binary_name())
    }

    /// Default transpiler executable.
    pub fn default_transpiler(&self) -> PathBuf {
        self.bin_dir().join(transpiler_binary_name())
    }
}

/// What to build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Structured text source
    pub program: String,

    /// Lines for `defines.h`
    pub definitions: Vec<String>,

    /// Optional user sketch written to `ext/arduino_sketch.h`
    pub sketch: Option<String>,

    /// Serial port to upload to
    pub port: Option<String>,

    /// Cache policy
    pub policy: CachePolicy,
}

impl BuildRequest {
    /// Create a request for `program` with no extras.
    pub fn new(program: impl Into<String>) -> Self {
        BuildRequest {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Set the cache policy.
    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the upload port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the preprocessor definitions.
    pub fn with_definitions<I, S>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definitions = definitions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user sketch.
    pub fn with_sketch(mut self, sketch: impl Into<String>) -> Self {
        self.sketch = Some(sketch.into());
        self
    }
}

/// Pauses between phases that give the filesystem time to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub after_program: Duration,
    pub after_glue: Duration,
    pub before_finalize: Duration,
}

impl SettleDelays {
    /// No waiting at all.
    pub const NONE: SettleDelays = SettleDelays {
        after_program: Duration::ZERO,
        after_glue: Duration::ZERO,
        before_finalize: Duration::ZERO,
    };
}

impl Default for SettleDelays {
    fn default() -> Self {
        SettleDelays {
            after_program: Duration::from_millis(200),
            after_glue: Duration::from_secs(2),
            before_finalize: Duration::from_secs(1),
        }
    }
}

/// Everything a build needs, resolved once before the first phase runs.
#[derive(Clone)]
pub struct BuildContext {
    /// Installation layout
    pub layout: Layout,

    /// Board manager executable
    pub cli: PathBuf,

    /// Transpiler executable
    pub transpiler: PathBuf,

    /// The build request
    pub request: BuildRequest,

    /// Timeout for each streamed command
    pub timeout: Option<Duration>,

    /// Settle delays
    pub settle: SettleDelays,

    /// Libraries installed before compiling
    pub required_libraries: RequiredLibraries,

    /// Cores that need no board manager URL
    pub builtin_cores: Regex,

    /// Extra compiler flags keyed by core id
    pub extra_flags: BTreeMap<String, String>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("layout", &self.layout)
            .field("cli", &self.cli)
            .field("transpiler", &self.transpiler)
            .field("policy", &self.request.policy)
            .field("port", &self.request.port)
            .field("timeout", &self.timeout)
            .field("settle", &self.settle)
            .field("required_libraries", &self.required_libraries.len())
            .field("builtin_cores", &self.builtin_cores.as_str())
            .field("extra_flags", &self.extra_flags)
            .finish()
    }
}

impl BuildContext {
    /// Create a context with default tool paths and settings.
    pub fn new(layout: Layout, request: BuildRequest) -> Self {
        let extra_flags = Config::default().extra_flags();
        BuildContext {
            cli: layout.default_cli(),
            transpiler: layout.default_transpiler(),
            layout,
            request,
            timeout: None,
            settle: SettleDelays::default(),
            required_libraries: RequiredLibraries::default(),
            builtin_cores: default_builtin_pattern(),
            extra_flags,
        }
    }

    /// Create a context from configuration. Relative paths in the
    /// configuration are resolved against the current directory.
    pub fn from_config(config: &Config, request: BuildRequest) -> Result<Self> {
        let layout = Layout::resolve(&config.root())?;
        let mut ctx = BuildContext::new(layout, request);

        if let Some(cli) = &config.paths.cli {
            ctx.cli = absolute(cli)?;
        }
        if let Some(transpiler) = &config.paths.transpiler {
            ctx.transpiler = absolute(transpiler)?;
        }
        ctx.timeout = config.timeout();
        if !config.settle() {
            ctx.settle = SettleDelays::NONE;
        }
        ctx.required_libraries = config.required_libraries();
        ctx.builtin_cores = config.builtin_pattern()?;
        ctx.extra_flags = config.extra_flags();

        Ok(ctx)
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the settle delays.
    pub fn with_settle(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    /// Set the required libraries.
    pub fn with_required_libraries(mut self, libraries: RequiredLibraries) -> Self {
        self.required_libraries = libraries;
        self
    }

    /// Cache policy of the request.
    pub fn policy(&self) -> CachePolicy {
        self.request.policy
    }

    /// Source directory shorthand.
    pub fn src_dir(&self) -> PathBuf {
        self.layout.src_dir()
    }

    /// Extra compiler flags for a board: the board's own, else the core's.
    pub fn extra_flags_for(&self, core: &str, board_flags: Option<&str>) -> Option<String> {
        board_flags
            .map(str::to_string)
            .or_else(|| self.extra_flags.get(core).cloned())
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("failed to get current directory")?
            .join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/opt/arduino");
        assert_eq!(layout.src_dir(), PathBuf::from("/opt/arduino/src"));
        assert_eq!(layout.hal_dir(), PathBuf::from("/opt/arduino/src/hal"));
        assert_eq!(layout.log_path(), PathBuf::from("/opt/arduino/src/build.log"));
        assert_eq!(
            layout.sketch_path(),
            PathBuf::from("/opt/arduino/examples/Baremetal/Baremetal.ino")
        );
        assert_eq!(
            layout.output_dir(),
            PathBuf::from("/opt/arduino/examples/Baremetal/build")
        );
        assert!(layout.default_cli().starts_with("/opt/arduino/bin"));
    }

    #[test]
    fn test_resolve_relative_root() {
        let layout = Layout::resolve(Path::new("editor/arduino")).unwrap();
        assert!(layout.root().is_absolute());
        assert!(layout.root().ends_with("editor/arduino"));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.paths.root = Some(PathBuf::from("/opt/arduino"));
        config.paths.transpiler = Some(PathBuf::from("/usr/local/bin/iec2c"));
        config.build.settle = Some(false);
        config.build.timeout_secs = Some(5);
        config.libraries.required = Some(vec!["CAN".into()]);

        let ctx = BuildContext::from_config(&config, BuildRequest::new("PROGRAM p END_PROGRAM"))
            .unwrap();

        assert_eq!(ctx.cli, Layout::new("/opt/arduino").default_cli());
        assert_eq!(ctx.transpiler, PathBuf::from("/usr/local/bin/iec2c"));
        assert_eq!(ctx.settle, SettleDelays::NONE);
        assert_eq!(ctx.timeout, Some(Duration::from_secs(5)));
        assert_eq!(ctx.required_libraries.len(), 1);
    }

    #[test]
    fn test_extra_flags_for() {
        let ctx = BuildContext::new(Layout::new("/opt/arduino"), BuildRequest::default());

        assert_eq!(
            ctx.extra_flags_for("esp32:esp32", None).as_deref(),
            Some("-MMD -c")
        );
        assert_eq!(ctx.extra_flags_for("arduino:avr", None), None);
        assert_eq!(
            ctx.extra_flags_for("arduino:avr", Some("-DFOO")).as_deref(),
            Some("-DFOO")
        );
        assert_eq!(ctx.extra_flags_for("esp32:esp32", Some("  ")), None);
    }
}
