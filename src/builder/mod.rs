//! Structured text to Arduino build pipeline.
//!
//! [`BuildPipeline::standard`] transpiles a program, generates the glue
//! between located variables and the runtime buffers, compiles the sketch for
//! a board and optionally uploads it.

pub mod context;
pub mod error;
pub mod events;
pub mod glue;
pub mod host;
pub mod patch;
pub mod phases;
pub mod pipeline;

pub use context::{BuildContext, BuildRequest, Layout, SettleDelays};
pub use error::BuildError;
pub use events::{BuildEvent, BuildObserver, NoObserver};
pub use pipeline::{BuildPipeline, BuildReport, BuildState, Phase, Session};
