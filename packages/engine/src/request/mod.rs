// packages/engine/src/request/mod.rs
//! I/O request model
//!
//! A request is owned by exactly one party at a time: the caller until it is
//! forwarded, then the lower layer until it completes. Completion consumes the
//! request, so a request cannot be completed twice.
//!
//! - **codes**: Major function, status and transfer-block codes
//! - **io_request**: `Request`, its parameter stack and the caller's `CompletionHandle`
//!
//! # Lifecycle
//!
//! ```text
//! Request::new() ──► (Request, CompletionHandle)
//!      │                      │
//!      ▼                      │
//!  classify / forward         │
//!      │                      │
//!      ▼                      ▼
//!  request.complete(status) ──► handle.wait() == status
//! ```

pub mod codes;
pub mod io_request;

pub use codes::{Direction, MajorFunction, Status};
pub use io_request::{
    CompletionHandle, CompletionParams, CompletionRoutine, Parameters, Request, RequestId,
    TransferBlock,
};
