// packages/engine/src/target/mod.rs
//! Forward targets (the next layer down the stack)
//!
//! A target either accepts a request, taking ownership until it completes
//! it, or rejects it synchronously and hands ownership straight back.
//!
//! - **ForwardTarget**: The sink the forwarding engine submits to
//! - **Loopback Target**: In-process simulated lower layer with worker threads

pub mod loopback;

pub use loopback::{LoopbackConfig, LoopbackStats, LoopbackTarget};

use crate::request::{Request, Status};
use std::fmt;
use std::sync::Arc;

/// Options attached to a single send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// The sender will not observe completion
    pub send_and_forget: bool,
}

impl SendOptions {
    pub fn send_and_forget() -> Self {
        Self {
            send_and_forget: true,
        }
    }
}

/// Synchronous rejection: the request comes back with the target's status
pub struct Rejected {
    pub request: Request,
    pub status: Status,
}

impl Rejected {
    pub fn new(request: Request, status: Status) -> Self {
        Self { request, status }
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("request", &self.request.id())
            .field("status", &self.status)
            .finish()
    }
}

/// Next layer in the stack
///
/// Accepting a request obliges the target to eventually call
/// `Request::complete` on it exactly once, from any thread.
pub trait ForwardTarget: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "lower"
    }

    /// Submit a request
    fn send(&self, request: Request, options: SendOptions) -> Result<(), Rejected>;
}

impl<T: ForwardTarget + ?Sized> ForwardTarget for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn send(&self, request: Request, options: SendOptions) -> Result<(), Rejected> {
        (**self).send(request, options)
    }
}
