// packages/engine/src/lib.rs
//! Interpose Engine Library
//!
//! An interposition layer for device I/O: it sits between callers and the
//! next layer down, sees every request addressed to a device, snapshots
//! qualifying payloads into a bounded history, and forwards everything
//! onward without changing what the caller observes.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **request**: Request model, parameter stack and completion handles
//! - **capture**: Bounded payload history and its exporters
//! - **interception**: Dispatch table, classifier, forwarder, reclaimer, filter device
//! - **target**: The next layer down, plus an in-process loopback
//! - **runtime**: I/O queue delivering requests to a filter device
//! - **observability**: Tracing and metrics setup
//! - **utils**: Configuration and errors

// Public module exports
pub mod capture;
pub mod interception;
pub mod observability;
pub mod request;
pub mod runtime;
pub mod target;
pub mod utils;

// Re-export commonly used types
pub use capture::{CaptureBuffer, CaptureSnapshot};
pub use interception::{FilterDevice, ForwardMode, ForwardOutcome, Policy};
pub use request::{CompletionHandle, Request, Status};
pub use runtime::{DispatchType, IoQueue};
pub use target::{ForwardTarget, LoopbackTarget};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::current();
        assert!(!info.version.is_empty());
        assert!(!info.git_hash.is_empty());
    }
}
