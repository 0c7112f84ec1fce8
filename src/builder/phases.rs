//! The standard build phases, in run order.

use std::path::Path;

use super::context::TRANSPILER_OUTPUTS;
use super::error::BuildError;
use super::glue::generate_glue;
use super::host::HostInfo;
use super::patch::patch_generated_sources;
use super::pipeline::{BuildState, Phase, Session};
use crate::core::board::BoardHal;
use crate::toolchain::{CoreManager, CoreStatus, LibraryManager, LibraryStatus};
use crate::util::fs;
use crate::util::process::ProcessBuilder;

/// Name of the structured text file handed to the transpiler.
pub const PROGRAM_FILE: &str = "plc_prog.st";

/// Transpiler outputs and their objects, removed by [`Finalize`] when enabled.
pub const INTERMEDIATE_FILES: &[&str] = &[
    "POUS.c",
    "POUS.h",
    "LOCATED_VARIABLES.h",
    "VARIABLES.csv",
    "Config0.c",
    "Config0.h",
    "Config0.o",
    "Res0.c",
    "Res0.o",
    "glueVars.c",
];

/// Truncate the log, record the host, clear stale transpiler outputs.
pub struct PrepareWorkspace;

impl Phase for PrepareWorkspace {
    fn name(&self) -> &'static str {
        "prepare-workspace"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let log = session.log();
        log.truncate()?;

        HostInfo::detect(session.runner()).log(log);

        let removed = fs::remove_files(&session.ctx.src_dir(), TRANSPILER_OUTPUTS)?;
        tracing::debug!("removed {} stale transpiler outputs", removed.len());
        Ok(())
    }
}

/// Fail early when a tool binary is absent.
pub struct VerifyToolchain;

impl Phase for VerifyToolchain {
    fn name(&self) -> &'static str {
        "verify-toolchain"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        for (tool, path) in [("iec2c", &ctx.transpiler), ("arduino-cli", &ctx.cli)] {
            if !path.is_file() {
                session
                    .log()
                    .message(format!("Error: {} not found at {}", tool, path.display()));
                return Err(BuildError::ToolMissing {
                    tool: tool.to_string(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Make sure the board's core is installed and current.
pub struct ProvisionCore;

impl ProvisionCore {
    fn full_setup(
        &self,
        session: &Session<'_>,
        cores: &CoreManager<'_>,
        board: &BoardHal,
    ) -> Result<(), BuildError> {
        let log = session.log();

        log.message("Cleaning download cache...");
        let status = session.run_tool(&["cache", "clean"])?;
        if !status.success() {
            return Err(BuildError::CoreProvisioning(format!(
                "cache clean exited with status {}",
                status
            )));
        }

        // Exits non-zero when a configuration already exists.
        session.cli.run_ok(["config", "init"]);

        if let Some(url) = board.board_manager_url() {
            log.message(format!("Registering board manager URL {}", url));
            session
                .cli
                .run_ok(["config", "remove", "board_manager.additional_urls", url]);
            let status = session.run_tool(&["config", "add", "board_manager.additional_urls", url])?;
            if !status.success() {
                return Err(BuildError::CoreProvisioning(format!(
                    "failed to register board manager URL {}",
                    url
                )));
            }
        }

        log.message(cores.reinstall(&board.core)?);
        Ok(())
    }
}

impl Phase for ProvisionCore {
    fn name(&self) -> &'static str {
        "provision-core"
    }

    fn run(&self, session: &Session<'_>, state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let log = session.log();
        let policy = session.ctx.policy();
        let cores =
            CoreManager::new(&session.cli).with_builtin_pattern(session.ctx.builtin_cores.clone());
        let core = state.board.core.clone();

        log.message("Checking Core and Board installation...");
        let (status, message) = cores.check_status(&core);
        log.message(&message);

        let needs_setup = cores.needs_board_setup(state.board);
        let updated = if status == CoreStatus::NotInstalled
            || needs_setup
            || policy.full_core_reinstall()
        {
            self.full_setup(session, &cores, state.board)?;
            true
        } else if status.needs_action() || policy.force_core_upgrade() {
            log.message(format!("Upgrading core {}...", core));
            log.message(cores.upgrade(&core)?);
            true
        } else {
            false
        };

        if updated {
            let version = cores.installed_version(&core);
            log.message(format!(
                "Core {} at version {}",
                core,
                version.as_deref().unwrap_or("unknown")
            ));
            state.board.record_core_update(version);
            state.core_updated = true;
        }
        Ok(())
    }
}

/// Install the required libraries that are missing.
pub struct InstallLibraries;

impl Phase for InstallLibraries {
    fn name(&self) -> &'static str {
        "install-libraries"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        LibraryManager::new(&session.cli).ensure_installed(&session.ctx.required_libraries)?;
        Ok(())
    }
}

/// Report library updates and apply the policy's library actions.
pub struct MaintainLibraries;

impl Phase for MaintainLibraries {
    fn name(&self) -> &'static str {
        "maintain-libraries"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let log = session.log();
        let policy = session.ctx.policy();
        let libraries = LibraryManager::new(&session.cli);

        log.message("Checking Libraries status...");
        let (status, message) = libraries.check_updatable();
        log.message(&message);
        if status == LibraryStatus::Error {
            tracing::warn!("{}", message);
        }

        if policy.clean_libraries() {
            libraries.clean_reinstall(&session.ctx.required_libraries)?;
        } else if policy.upgrade_libraries() {
            log.message(libraries.upgrade_all()?);
        }
        Ok(())
    }
}

/// Write the program and run the transpiler on it.
pub struct Transpile;

impl Phase for Transpile {
    fn name(&self) -> &'static str {
        "transpile"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        let src = ctx.src_dir();

        session.log().message("Compiling .st file...");
        fs::write_string(&src.join(PROGRAM_FILE), &ctx.request.program)?;
        session.settle(ctx.settle.after_program);

        let cmd = ProcessBuilder::new(&ctx.transpiler)
            .args(["-f", "-l", "-p", PROGRAM_FILE])
            .cwd(&src);
        let status = session.run_command(&cmd)?;
        if !status.success() {
            return Err(BuildError::TranspileFailed(status.code()));
        }
        Ok(())
    }
}

/// Copy the board's HAL source to `arduino.cpp`.
pub struct StageHal;

impl Phase for StageHal {
    fn name(&self) -> &'static str {
        "stage-hal"
    }

    fn run(&self, session: &Session<'_>, state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        let hal = ctx.layout.hal_dir().join(&state.board.source);
        if !hal.is_file() {
            return Err(BuildError::io(
                hal,
                std::io::Error::new(std::io::ErrorKind::NotFound, "HAL source not found"),
            ));
        }
        session
            .log()
            .message(format!("Using HAL {}", state.board.source));
        fs::copy_file(&hal, &ctx.src_dir().join("arduino.cpp"))?;
        Ok(())
    }
}

/// Write `defines.h`.
pub struct WriteDefinitions;

impl Phase for WriteDefinitions {
    fn name(&self) -> &'static str {
        "write-definitions"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        fs::write_string(
            &ctx.src_dir().join("defines.h"),
            &ctx.request.definitions.join("\n"),
        )?;
        Ok(())
    }
}

/// Replace the optional user sketch header.
pub struct WriteSketch;

impl Phase for WriteSketch {
    fn name(&self) -> &'static str {
        "write-sketch"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        let path = ctx.src_dir().join("ext").join("arduino_sketch.h");
        fs::remove_file_if_exists(&path)?;
        if let Some(sketch) = &ctx.request.sketch {
            fs::write_string(&path, sketch)?;
        }
        Ok(())
    }
}

/// Turn `LOCATED_VARIABLES.h` into `glueVars.c`.
pub struct GenerateGlue;

impl Phase for GenerateGlue {
    fn name(&self) -> &'static str {
        "generate-glue"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        let log = session.log();
        let src = ctx.src_dir();

        log.message("Generating glueVars.c...");
        let header = src.join("LOCATED_VARIABLES.h");
        let located = fs::read_to_string(&header).map_err(|e| {
            log.message("Error: Couldn't find LOCATED_VARIABLES.h");
            e
        })?;

        let glue = generate_glue(&located).map_err(|e| {
            log.message(format!("Error: {}", e));
            e
        })?;
        fs::write_string(&src.join("glueVars.c"), &glue)?;
        session.settle(ctx.settle.after_glue);
        Ok(())
    }
}

/// Fix the includes the transpiler generates.
pub struct PatchSources;

impl Phase for PatchSources {
    fn name(&self) -> &'static str {
        "patch-sources"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        patch_generated_sources(&session.ctx.src_dir())?;
        Ok(())
    }
}

/// Compile the sketch for the board.
pub struct Compile;

/// Arguments of the `compile` invocation for `board`.
pub fn compile_args(session: &Session<'_>, board: &BoardHal) -> Vec<String> {
    let ctx = session.ctx;
    let extra = ctx
        .extra_flags_for(&board.core, board.extra_flags.as_deref())
        .map(|flags| format!(" {}", flags))
        .unwrap_or_default();
    let include = format!("-I{}{}", ctx.layout.lib_include_dir().display(), extra);

    let mut args = vec!["compile".to_string(), "-v".to_string()];
    if ctx.policy().clean_build() {
        args.push("--clean".to_string());
    }
    args.push(format!("--libraries={}", ctx.layout.root().display()));
    args.push("--build-property".to_string());
    args.push(format!("compiler.c.extra_flags={}", include));
    args.push("--build-property".to_string());
    args.push(format!("compiler.cpp.extra_flags={}", include));
    args.push("--export-binaries".to_string());
    args.push("-b".to_string());
    args.push(board.platform.clone());
    args.push(ctx.layout.sketch_path().display().to_string());
    args
}

impl Phase for Compile {
    fn name(&self) -> &'static str {
        "compile"
    }

    fn run(&self, session: &Session<'_>, state: &mut BuildState<'_>) -> Result<(), BuildError> {
        session.log().message("Generating binary file...");
        let status = session.run_tool(&compile_args(session, state.board))?;
        if !status.success() {
            return Err(BuildError::CompileFailed(status.code()));
        }
        Ok(())
    }
}

/// Upload to the requested port, or report where the binaries are.
pub struct UploadOrReport;

impl Phase for UploadOrReport {
    fn name(&self) -> &'static str {
        "upload-or-report"
    }

    fn run(&self, session: &Session<'_>, state: &mut BuildState<'_>) -> Result<(), BuildError> {
        let ctx = session.ctx;
        let log = session.log();

        let Some(port) = ctx.request.port.as_deref() else {
            let output = ctx.layout.output_dir();
            log.message(format!("\nOUTPUT DIRECTORY:\n{}\n", output.display()));
            log.message("COMPILATION DONE!");
            state.output_dir = Some(output);
            return Ok(());
        };

        log.message(format!("Uploading program to Arduino board at {}...", port));
        let sketch_dir = ctx.layout.sketch_dir().display().to_string();
        let status = session.run_tool(&[
            "upload",
            "--port",
            port,
            "--fqbn",
            state.board.platform.as_str(),
            sketch_dir.as_str(),
        ])?;
        if !status.success() {
            return Err(BuildError::UploadFailed {
                port: port.to_string(),
                code: status.code(),
            });
        }
        log.message("Done!");
        state.uploaded_to = Some(port.to_string());
        Ok(())
    }
}

/// Let the filesystem settle; optionally remove intermediate files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Finalize {
    /// Remove [`INTERMEDIATE_FILES`]. Off in the standard pipeline.
    pub clean_intermediates: bool,
}

impl Phase for Finalize {
    fn name(&self) -> &'static str {
        "finalize"
    }

    fn run(&self, session: &Session<'_>, _state: &mut BuildState<'_>) -> Result<(), BuildError> {
        session.settle(session.ctx.settle.before_finalize);
        if self.clean_intermediates {
            remove_intermediates(&session.ctx.src_dir())?;
        }
        Ok(())
    }
}

fn remove_intermediates(src: &Path) -> Result<(), BuildError> {
    fs::remove_files(src, INTERMEDIATE_FILES)?;
    Ok(())
}
