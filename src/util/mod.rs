//! Shared utilities

pub mod config;
pub mod context;
pub mod fs;
pub mod log;
pub mod process;
pub mod shell;

pub use config::Config;
pub use context::GlobalContext;
pub use log::{BuildLog, NullSink, OutputSink};
pub use process::{ProcessBuilder, ProcessRunner, RunStatus, SystemRunner};
pub use shell::Shell;
