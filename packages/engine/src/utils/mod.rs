// packages/engine/src/utils/mod.rs
//! Common utilities
//!
//! - **config**: Layered engine configuration (defaults, file, environment)
//! - **errors**: Crate-wide error type and `Result` alias

pub mod config;
pub mod errors;

pub use self::config::EngineConfig;
pub use self::errors::{EngineError, Result};
