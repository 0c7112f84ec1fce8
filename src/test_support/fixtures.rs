//! Test fixtures for common test scenarios.
//!
//! [`TestWorkspace`] lays out an installation directory the way the build
//! expects it; [`TestLog`] gives manager tests a throwaway build log.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::builder::context::{cli_binary_name, transpiler_binary_name, Layout};
use crate::core::board::{BoardHal, HalCatalog};
use crate::toolchain::ToolCli;
use crate::util::log::{BuildLog, NullSink};

/// Board manager URL used by the ESP32 fixture.
pub const ESP32_URL: &str = "https://espressif.github.io/arduino-esp32/package_esp32_index.json";

/// A build log in a temporary directory that discards sink output.
pub struct TestLog {
    _dir: TempDir,
    log: BuildLog<'static>,
}

impl TestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let log = BuildLog::new(dir.path().join("build.log"), &NullSink);
        TestLog { _dir: dir, log }
    }

    /// The underlying log.
    pub fn log(&self) -> &BuildLog<'static> {
        &self.log
    }

    /// A tool handle routed through `runner` and this log.
    pub fn cli<'a>(&'a self, runner: &'a dyn crate::util::process::ProcessRunner) -> ToolCli<'a> {
        ToolCli::new("arduino-cli", runner, &self.log)
    }

    /// Everything logged so far.
    pub fn contents(&self) -> String {
        fs::read_to_string(self.log.path()).unwrap_or_default()
    }
}

impl Default for TestLog {
    fn default() -> Self {
        TestLog::new()
    }
}

/// An installation directory with HAL files, tool stubs and the sketch.
pub struct TestWorkspace {
    _dir: TempDir,
    layout: Layout,
}

impl TestWorkspace {
    /// Create a complete layout.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let layout = Layout::new(dir.path().join("arduino"));

        let files = [
            (layout.hal_dir().join("uno.cpp"), "// uno hal\n"),
            (layout.hal_dir().join("esp32.cpp"), "// esp32 hal\n"),
            (layout.lib_include_dir().join("iec_std_lib.h"), "// runtime\n"),
            (layout.bin_dir().join(cli_binary_name()), ""),
            (layout.bin_dir().join(transpiler_binary_name()), ""),
            (layout.sketch_path(), "void setup() {}\nvoid loop() {}\n"),
        ];
        for (path, contents) in files {
            fs::create_dir_all(path.parent().expect("fixture paths have parents"))
                .expect("failed to create fixture directory");
            fs::write(&path, contents).expect("failed to write fixture file");
        }

        TestWorkspace { _dir: dir, layout }
    }

    /// The workspace layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Installation root.
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Path of a file in the source directory.
    pub fn src(&self, name: &str) -> PathBuf {
        self.layout.src_dir().join(name)
    }

    /// Read a file from the source directory.
    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.src(name))
            .unwrap_or_else(|e| panic!("failed to read {}: {}", name, e))
    }

    /// Write a file into the source directory.
    pub fn write(&self, name: &str, contents: &str) {
        let path = self.src(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create directory");
        }
        fs::write(path, contents).expect("failed to write file");
    }

    /// Delete a tool binary stub.
    pub fn remove_tool(&self, name: &str) {
        fs::remove_file(self.layout.bin_dir().join(name)).expect("failed to remove tool");
    }

    /// Write a catalog with the standard boards.
    pub fn write_catalog(&self) -> HalCatalog {
        let mut catalog = HalCatalog::default();
        catalog.insert("Arduino Uno", uno());
        catalog.insert("ESP32", esp32());
        catalog
            .save(&self.layout.catalog_path())
            .expect("failed to write catalog");
        catalog
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        TestWorkspace::new()
    }
}

/// Arduino Uno: built-in core, no board manager URL.
pub fn uno() -> BoardHal {
    BoardHal::new("arduino:avr:uno", "arduino:avr", "uno.cpp")
}

/// ESP32: third-party core with a board manager URL and extra flags.
pub fn esp32() -> BoardHal {
    BoardHal::new("esp32:esp32:esp32", "esp32:esp32", "esp32.cpp").with_board_manager_url(ESP32_URL)
}
