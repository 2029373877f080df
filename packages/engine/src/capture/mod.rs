// packages/engine/src/capture/mod.rs
//! Payload capture and history inspection
//!
//! - **Capture Buffer**: Fixed-capacity ring of payload snapshots
//! - **Exporter**: Render snapshots as JSON or hex tables for offline analysis
//!
//! # Architecture
//!
//! ```text
//! Classifier ──► record(payload) ──► [slot 0][slot 1] ... [slot N-1]
//!                                          ▲ cursor (newest)
//!                                          │
//! Inspector  ◄── snapshot() ◄──────────────┘
//!     │
//!     └─► Exporter (JSON / hex)
//! ```

pub mod capture_buffer;
pub mod exporter;

pub use capture_buffer::{CaptureBuffer, CaptureSnapshot, DEFAULT_CAPACITY, DEFAULT_SLOT_SIZE};
pub use exporter::{ExportFormat, Exporter};
