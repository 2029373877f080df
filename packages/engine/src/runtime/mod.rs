// packages/engine/src/runtime/mod.rs
//! Request delivery runtime
//!
//! The I/O queue is how requests reach a filter device: either each on its
//! own tokio task or funnelled through one worker in arrival order.

pub mod io_queue;

pub use io_queue::{DispatchType, IoQueue};
