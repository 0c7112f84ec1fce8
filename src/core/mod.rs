//! Core data structures for iecport.
//!
//! - Board descriptors and the HAL catalog
//! - The default required library set
//! - The cache policy ladder

pub mod board;
pub mod libraries;
pub mod policy;

pub use board::{BoardHal, HalCatalog};
pub use libraries::RequiredLibraries;
pub use policy::CachePolicy;
