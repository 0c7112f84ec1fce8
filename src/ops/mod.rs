//! High-level operations.
//!
//! This module contains the implementation of iecport commands.

pub mod build;
pub mod doctor;
pub mod manage;

pub use build::{
    build, catalog_path, load_catalog, resolve_config, tool_context, BuildOptions, Overrides,
};
pub use doctor::{doctor, format_report, CheckResult, DoctorReport};
