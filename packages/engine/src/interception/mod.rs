// packages/engine/src/interception/mod.rs
//! Request interposition layer
//!
//! Sits between callers and the next layer down and sees every request
//! addressed to a device:
//!
//! - **Dispatch Table**: request code to inspection policy
//! - **Classifier**: applies the policy, capturing qualifying payloads
//! - **Forwarder**: sends to the next layer, fire-and-forget or intercepted
//! - **Reclaimer**: completion routine that finalizes intercepted requests
//! - **Filter Device**: per-family entry points wiring the above together
//!
//! # Architecture
//!
//! ```text
//! Caller
//!     │ Request
//!     ▼
//! FilterDevice::dispatch ── on_read / on_device_control / on_internal_device_control / on_default
//!     │
//!     ├─ RequestClassifier ── DispatchTable lookup ──► CaptureBuffer (inbound 8-byte transfers)
//!     │
//!     └─ ForwardingEngine ──send──► ForwardTarget (next layer)
//!             │                         │
//!             │ rejected: complete      │ completes
//!             │ locally with status     ▼
//!             │               CompletionReclaimer (intercepted mode) ──► Caller
//!             ▼                         or straight to the Caller (fire-and-forget)
//!          Caller
//! ```

pub mod classifier;
pub mod dispatch_table;
pub mod filter;
pub mod forwarder;
pub mod reclaimer;

// Re-export commonly used types
pub use classifier::{Disposition, RequestClassifier};
pub use dispatch_table::{DispatchTable, Policy};
pub use filter::{ControlCodeHandler, FilterDevice};
pub use forwarder::{ForwardMode, ForwardOutcome, ForwardStats, ForwardingEngine};
pub use reclaimer::{CompletionContext, CompletionReclaimer, InFlight};
