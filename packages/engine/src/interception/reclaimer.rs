// packages/engine/src/interception/reclaimer.rs
//! Completion reclaimer
//!
//! Registered as the completion routine of every request forwarded in
//! completion-intercepted mode. Runs on whatever thread the lower layer
//! completes on and finalizes the request with the lower layer's status,
//! unchanged. It never looks at the payload or the capture buffer.

use crate::observability::metrics;
use crate::request::{CompletionParams, MajorFunction, Request, RequestId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

/// Correlates an intercepted request with its pending completion
#[derive(Debug, Clone, Copy)]
pub struct CompletionContext {
    pub major: MajorFunction,
    pub submitted_at: Instant,
}

impl CompletionContext {
    pub fn new(major: MajorFunction) -> Self {
        Self {
            major,
            submitted_at: Instant::now(),
        }
    }
}

/// Outstanding intercepted requests, shared by the engine and the reclaimer
pub type InFlight = Arc<DashMap<RequestId, CompletionContext>>;

/// Completion reclaimer
pub struct CompletionReclaimer {
    in_flight: InFlight,
    reclaimed: AtomicU64,
}

impl CompletionReclaimer {
    pub fn new(in_flight: InFlight) -> Self {
        Self {
            in_flight,
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Finalize `request` with the status the lower layer produced
    pub fn on_complete(&self, request: Request, params: CompletionParams) {
        match self.in_flight.remove(&request.id()) {
            Some((id, context)) => trace!(
                "Reclaimed {} ({}) after {:?} with {}",
                id,
                context.major,
                context.submitted_at.elapsed(),
                params.status
            ),
            None => warn!(
                "Reclaimed request {} had no completion context",
                request.id()
            ),
        }

        self.reclaimed.fetch_add(1, Ordering::Relaxed);
        metrics::record_reclaimed();
        metrics::set_in_flight(self.in_flight.len());

        request.complete(params.status);
    }

    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }
}
