//! iecport - build IEC 61131-3 structured text programs for Arduino boards
//!
//! This crate drives an external transpiler and the `arduino-cli` board
//! manager: it provisions cores and libraries according to a cache policy,
//! turns a structured text program into C sources plus generated glue code,
//! compiles them into a sketch and optionally uploads the result.

pub mod builder;
pub mod core;
pub mod ops;
pub mod toolchain;
pub mod util;

/// Test utilities and mocks for iecport unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted board manager and transpiler and
/// temporary installation layouts.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, BuildError, BuildPipeline, BuildReport, BuildRequest};
pub use core::{BoardHal, CachePolicy, HalCatalog, RequiredLibraries};
pub use util::context::GlobalContext;
