//! Test support utilities for iecport.
//!
//! [`FakeRunner`] stands in for the board manager and the transpiler. It keeps
//! an in-memory model of installed libraries, cores and board manager URLs,
//! answers JSON queries from that model and updates it when install or
//! uninstall commands are streamed, so manager logic can be tested end to end
//! without touching the network.

pub mod fixtures;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::util::process::{LineSink, ProcessBuilder, ProcessRunner, RunStatus};

pub use fixtures::{TestLog, TestWorkspace};

/// Version reported for cores installed through the fake.
pub const FAKE_CORE_VERSION: &str = "2.0.0";

/// Located variables written by the fake transpiler unless overridden.
pub const DEFAULT_LOCATED_VARIABLES: &str = "\
__LOCATED_VAR(BOOL,__IX0_0,I,X,0,0)
__LOCATED_VAR(BOOL,__QX0_1,Q,X,0,1)
__LOCATED_VAR(INT,__IW0,I,W,0)
";

#[derive(Debug, Default)]
struct FakeState {
    libraries: BTreeSet<String>,
    updatable_libraries: BTreeSet<String>,
    cores: BTreeMap<String, String>,
    updatable_cores: BTreeSet<String>,
    board_urls: Vec<String>,
    failing_installs: BTreeSet<String>,
    hanging: Vec<String>,
    index_error: Option<String>,
    malformed_json: bool,
    transpiler_exit: i32,
    located_variables: Option<String>,
    compile_exit: i32,
    upload_exit: i32,
    cache_clean_exit: i32,
    commands: Vec<String>,
}

/// Scripted [`ProcessRunner`] simulating the board manager and transpiler.
#[derive(Debug, Default)]
pub struct FakeRunner {
    state: RefCell<FakeState>,
}

impl FakeRunner {
    /// Create a fake with nothing installed where every command succeeds.
    pub fn new() -> Self {
        FakeRunner::default()
    }

    /// Mark libraries as installed.
    pub fn with_libraries<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .libraries
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Mark libraries as installed with a newer release available.
    pub fn with_updatable_libraries<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.borrow_mut();
            for name in names {
                let name = name.into();
                state.libraries.insert(name.clone());
                state.updatable_libraries.insert(name);
            }
        }
        self
    }

    /// Mark a core as installed at `version`.
    pub fn with_core(self, id: &str, version: &str) -> Self {
        self.state
            .borrow_mut()
            .cores
            .insert(id.to_string(), version.to_string());
        self
    }

    /// Report an update for an installed core.
    pub fn with_updatable_core(self, id: &str) -> Self {
        self.state.borrow_mut().updatable_cores.insert(id.to_string());
        self
    }

    /// Register an additional board manager URL.
    pub fn with_board_url(self, url: &str) -> Self {
        self.state.borrow_mut().board_urls.push(url.to_string());
        self
    }

    /// Make `lib install <name>` and `core install <name>` fail.
    pub fn with_failing_install(self, name: &str) -> Self {
        self.state
            .borrow_mut()
            .failing_installs
            .insert(name.to_string());
        self
    }

    /// Make the core index update report `message`.
    pub fn with_index_error(self, message: &str) -> Self {
        self.state.borrow_mut().index_error = Some(message.to_string());
        self
    }

    /// Answer every JSON query with something that is not JSON.
    pub fn with_malformed_json(self) -> Self {
        self.state.borrow_mut().malformed_json = true;
        self
    }

    /// Streamed commands starting with `prefix` never finish.
    pub fn with_hanging(self, prefix: &str) -> Self {
        self.state.borrow_mut().hanging.push(prefix.to_string());
        self
    }

    /// Exit code of the transpiler. Non-zero exits write no output files.
    pub fn with_transpiler_exit(self, code: i32) -> Self {
        self.state.borrow_mut().transpiler_exit = code;
        self
    }

    /// Contents of the `LOCATED_VARIABLES.h` the transpiler writes.
    pub fn with_located_variables(self, contents: &str) -> Self {
        self.state.borrow_mut().located_variables = Some(contents.to_string());
        self
    }

    /// Exit code of `compile`.
    pub fn with_compile_exit(self, code: i32) -> Self {
        self.state.borrow_mut().compile_exit = code;
        self
    }

    /// Exit code of `upload`.
    pub fn with_upload_exit(self, code: i32) -> Self {
        self.state.borrow_mut().upload_exit = code;
        self
    }

    /// Exit code of `cache clean`.
    pub fn with_cache_clean_exit(self, code: i32) -> Self {
        self.state.borrow_mut().cache_clean_exit = code;
        self
    }

    /// Every command run so far, as its space-joined arguments.
    ///
    /// Board manager commands are recorded without the program; other
    /// programs are recorded with their file name first.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Number of commands whose arguments, ignoring output format flags,
    /// start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|cmd| normalize(cmd).starts_with(prefix))
            .count()
    }

    /// Position of the first command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.state
            .borrow()
            .commands
            .iter()
            .position(|cmd| normalize(cmd).starts_with(prefix))
    }

    /// Whether a library is currently installed.
    pub fn has_library(&self, name: &str) -> bool {
        self.state.borrow().libraries.contains(name)
    }

    /// Whether a core is currently installed.
    pub fn has_core(&self, id: &str) -> bool {
        self.state.borrow().cores.contains_key(id)
    }

    /// Currently registered board manager URLs.
    pub fn board_urls(&self) -> Vec<String> {
        self.state.borrow().board_urls.clone()
    }

    fn record(&self, cmd: &ProcessBuilder) -> Vec<String> {
        let args = tool_args(cmd);
        let line = if is_transpiler(cmd.get_program()) {
            let mut parts = vec!["iec2c".to_string()];
            parts.extend(cmd.get_args().iter().cloned());
            parts.join(" ")
        } else {
            cmd.get_args().join(" ")
        };
        self.state.borrow_mut().commands.push(line);
        args
    }

    fn query(&self, args: &[String]) -> String {
        let state = self.state.borrow();
        let words: Vec<&str> = args.iter().map(String::as_str).collect();

        if words.as_slice() == ["core", "update-index"] {
            if state.malformed_json {
                return "Error: not json".to_string();
            }
            return match &state.index_error {
                Some(message) => json!({ "error": message }).to_string(),
                None => json!({ "updated_indexes": [] }).to_string(),
            };
        }

        if state.malformed_json {
            return "Error: not json".to_string();
        }

        match words.as_slice() {
            ["lib", "list"] => library_list(state.libraries.iter()),
            ["lib", "list", "--updatable"] => library_list(state.updatable_libraries.iter()),
            ["core", "list"] => platform_list(state.cores.iter()),
            ["core", "list", "--updatable"] => platform_list(
                state
                    .cores
                    .iter()
                    .filter(|(id, _)| state.updatable_cores.contains(*id)),
            ),
            ["config", "dump", "--format", "json"] => json!({
                "config": { "board_manager": { "additional_urls": state.board_urls } }
            })
            .to_string(),
            _ => "{}".to_string(),
        }
    }

    fn execute(&self, args: &[String], sink: &dyn LineSink) -> i32 {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let words: Vec<&str> = args.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["lib", "update-index"] => 0,
            ["lib", "install", name] => {
                if state.failing_installs.contains(*name) {
                    sink.line(&format!("Error installing {}: library not found", name));
                    return 1;
                }
                state.libraries.insert(name.to_string());
                state.updatable_libraries.remove(*name);
                sink.line(&format!("Installed {}", name));
                0
            }
            ["lib", "uninstall", name] => {
                if state.libraries.remove(*name) {
                    state.updatable_libraries.remove(*name);
                    0
                } else {
                    1
                }
            }
            ["lib", "upgrade"] => {
                state.updatable_libraries.clear();
                0
            }
            ["core", "update-index"] => i32::from(state.index_error.is_some()),
            ["core", "install", id] => {
                if state.failing_installs.contains(*id) {
                    sink.line(&format!("Error during install: platform {} not found", id));
                    return 1;
                }
                state
                    .cores
                    .insert(id.to_string(), FAKE_CORE_VERSION.to_string());
                state.updatable_cores.remove(*id);
                sink.line(&format!("Platform {}@{} installed", id, FAKE_CORE_VERSION));
                0
            }
            ["core", "uninstall", id] => {
                if state.cores.remove(*id).is_some() {
                    state.updatable_cores.remove(*id);
                    0
                } else {
                    1
                }
            }
            ["core", "upgrade", id] => match state.cores.get_mut(*id) {
                Some(version) => {
                    *version = FAKE_CORE_VERSION.to_string();
                    state.updatable_cores.remove(*id);
                    0
                }
                None => 1,
            },
            ["cache", "clean"] => state.cache_clean_exit,
            ["config", "init"] => {
                sink.line("Config file already exists, use --overwrite to discard the existing one.");
                1
            }
            ["config", "add", "board_manager.additional_urls", url] => {
                state.board_urls.push(url.to_string());
                0
            }
            ["config", "remove", "board_manager.additional_urls", url] => {
                let before = state.board_urls.len();
                state.board_urls.retain(|u| u != url);
                i32::from(before == state.board_urls.len())
            }
            ["compile", ..] => {
                if state.compile_exit == 0 {
                    sink.line("Sketch uses 10240 bytes (31%) of program storage space.");
                }
                state.compile_exit
            }
            ["upload", ..] => state.upload_exit,
            _ => {
                sink.line(&format!("Error: unknown command {}", words.join(" ")));
                1
            }
        }
    }

    fn transpile(&self, cmd: &ProcessBuilder, sink: &dyn LineSink) -> Result<i32> {
        let state = self.state.borrow();
        if state.transpiler_exit != 0 {
            sink.line("plc_prog.st:1: error: syntax error");
            return Ok(state.transpiler_exit);
        }

        let Some(cwd) = cmd.get_cwd() else {
            bail!("transpiler run without a working directory");
        };
        let located = state
            .located_variables
            .as_deref()
            .unwrap_or(DEFAULT_LOCATED_VARIABLES);

        let outputs = [
            ("POUS.c", "void PROGRAM0_body__(PROGRAM0 *data__) {}\n"),
            ("POUS.h", "#include \"accessor.h\"\n"),
            (
                "Res0.c",
                "#include \"iec_std_lib.h\"\n#include \"POUS.c\"\n\nvoid RES0_run__(unsigned long tick) {}\n",
            ),
            ("LOCATED_VARIABLES.h", located),
            ("Config0.c", "#include \"Config0.h\"\n"),
            ("Config0.h", "#include \"beremiz.h\"\n"),
            ("VARIABLES.csv", "// Programs\n0;CONFIG.RES0.INSTANCE0;PROGRAM0;\n"),
        ];
        for (name, contents) in outputs {
            std::fs::write(cwd.join(name), contents)
                .with_context(|| format!("failed to write {}", name))?;
        }
        Ok(0)
    }
}

impl ProcessRunner for FakeRunner {
    fn capture(&self, cmd: &ProcessBuilder) -> Result<String> {
        let args = self.record(cmd);
        if is_tool(cmd.get_program()) {
            Ok(self.query(&args))
        } else {
            Ok(String::new())
        }
    }

    fn stream(
        &self,
        cmd: &ProcessBuilder,
        sink: &dyn LineSink,
        _timeout: Option<Duration>,
    ) -> Result<RunStatus> {
        let args = self.record(cmd);
        sink.line(&format!("$ {}", cmd));

        let hangs = {
            let joined = args.join(" ");
            self.state
                .borrow()
                .hanging
                .iter()
                .any(|prefix| joined.starts_with(prefix.as_str()))
        };
        let status = if hangs {
            RunStatus::TimedOut
        } else if is_transpiler(cmd.get_program()) {
            RunStatus::Code(self.transpile(cmd, sink)?)
        } else {
            RunStatus::Code(self.execute(&args, sink))
        };

        sink.line(&format!("$? = {}", status));
        Ok(status)
    }
}

fn is_transpiler(program: &Path) -> bool {
    program
        .file_name()
        .map(|name| name.to_string_lossy().starts_with("iec2c"))
        .unwrap_or(false)
}

fn is_tool(program: &Path) -> bool {
    !is_transpiler(program)
        && program
            .file_name()
            .map(|name| name.to_string_lossy().starts_with("arduino-cli"))
            .unwrap_or(false)
}

/// Arguments with output format flags removed.
fn tool_args(cmd: &ProcessBuilder) -> Vec<String> {
    cmd.get_args()
        .iter()
        .filter(|arg| *arg != "--no-color" && *arg != "--json")
        .cloned()
        .collect()
}

fn normalize(line: &str) -> String {
    line.split(' ')
        .filter(|arg| *arg != "--no-color" && *arg != "--json")
        .collect::<Vec<_>>()
        .join(" ")
}

fn library_list<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let entries: Vec<_> = names
        .map(|name| json!({ "library": { "name": name, "version": "1.0.0" } }))
        .collect();
    json!({ "installed_libraries": entries }).to_string()
}

fn platform_list<'a>(cores: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    let entries: Vec<_> = cores
        .map(|(id, version)| json!({ "id": id, "installed_version": version }))
        .collect();
    json!({ "platforms": entries }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLI: &str = "/opt/bin/arduino-cli-l64";

    #[test]
    fn test_install_updates_inventory() {
        let runner = FakeRunner::new();
        let sink = |_: &str| {};

        let cmd = ProcessBuilder::new(CLI).args(["--no-color", "lib", "install", "CAN"]);
        let status = runner.stream(&cmd, &sink, None).unwrap();

        assert!(status.success());
        assert!(runner.has_library("CAN"));
        assert_eq!(runner.count("lib install CAN"), 1);
        assert_eq!(runner.commands(), vec!["--no-color lib install CAN"]);
    }

    #[test]
    fn test_malformed_json() {
        let runner = FakeRunner::new().with_malformed_json();
        let cmd = ProcessBuilder::new(CLI).args(["--json", "--no-color", "lib", "list"]);

        let output = runner.capture(&cmd).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&output).is_err());
    }

    #[test]
    fn test_transpiler_writes_outputs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let runner = FakeRunner::new();
        let sink = |_: &str| {};

        let cmd = ProcessBuilder::new("/opt/bin/iec2c")
            .args(["-f", "-l", "-p", "plc_prog.st"])
            .cwd(tmp.path());
        let status = runner.stream(&cmd, &sink, None).unwrap();

        assert!(status.success());
        assert!(tmp.path().join("LOCATED_VARIABLES.h").exists());
        assert_eq!(runner.count("iec2c -f -l -p"), 1);
    }

    #[test]
    fn test_hanging_command_times_out() {
        let runner = FakeRunner::new().with_hanging("compile");
        let sink = |_: &str| {};

        let cmd = ProcessBuilder::new(CLI).args(["--no-color", "compile", "-v"]);
        let status = runner.stream(&cmd, &sink, None).unwrap();
        assert_eq!(status, RunStatus::TimedOut);
    }
}
