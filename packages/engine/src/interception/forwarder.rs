// packages/engine/src/interception/forwarder.rs
//! Forwarding engine
//!
//! Sends requests to the next layer in one of two modes:
//!
//! - **FireAndForget**: submit and return; the target completes the request
//!   straight back to the caller.
//! - **CompletionIntercepted**: format the request for the next layer and
//!   register the completion reclaimer before submitting, so control returns
//!   here when the target completes it.
//!
//! A synchronous rejection is completed locally with the target's status. In
//! intercepted mode the completion routine is unregistered first, so exactly
//! one of {local completion, reclaimer completion} happens per request.

use crate::interception::reclaimer::{CompletionContext, CompletionReclaimer, InFlight};
use crate::observability::metrics;
use crate::request::{Request, Status};
use crate::target::{ForwardTarget, Rejected, SendOptions};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Forwarding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardMode {
    /// Submit and never observe completion
    #[default]
    FireAndForget,

    /// Regain control through the completion reclaimer
    CompletionIntercepted,
}

impl ForwardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwardMode::FireAndForget => "fire_and_forget",
            ForwardMode::CompletionIntercepted => "completion_intercepted",
        }
    }
}

/// What happened to a forwarded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Accepted by the target
    Submitted,

    /// Rejected by the target and completed here with its status
    CompletedLocally(Status),
}

/// Forwarding counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub submitted: u64,
    pub completed_locally: u64,
    pub reclaimed: u64,
    pub in_flight: usize,
}

/// Forwarding engine
pub struct ForwardingEngine {
    reclaimer: Arc<CompletionReclaimer>,
    in_flight: InFlight,
    submitted: AtomicU64,
    completed_locally: AtomicU64,
}

impl ForwardingEngine {
    pub fn new() -> Self {
        let in_flight: InFlight = Arc::new(DashMap::new());
        Self {
            reclaimer: Arc::new(CompletionReclaimer::new(Arc::clone(&in_flight))),
            in_flight,
            submitted: AtomicU64::new(0),
            completed_locally: AtomicU64::new(0),
        }
    }

    /// Forward `request` to `target`
    pub fn forward(
        &self,
        request: Request,
        target: &dyn ForwardTarget,
        mode: ForwardMode,
    ) -> ForwardOutcome {
        match mode {
            ForwardMode::FireAndForget => self.send_and_forget(request, target),
            ForwardMode::CompletionIntercepted => self.send_with_completion(request, target),
        }
    }

    fn send_and_forget(&self, request: Request, target: &dyn ForwardTarget) -> ForwardOutcome {
        let id = request.id();
        match target.send(request, SendOptions::send_and_forget()) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::record_submitted(ForwardMode::FireAndForget.as_str());
                trace!("Request {} sent to {}", id, target.name());
                ForwardOutcome::Submitted
            }
            Err(rejected) => {
                self.complete_rejected(rejected, target, ForwardMode::FireAndForget)
            }
        }
    }

    fn send_with_completion(
        &self,
        mut request: Request,
        target: &dyn ForwardTarget,
    ) -> ForwardOutcome {
        let id = request.id();

        request.format_using_current_type();

        // Context goes in before the send: the target may complete on
        // another thread before `send` returns.
        self.in_flight
            .insert(id, CompletionContext::new(request.major_function()));
        let reclaimer = Arc::clone(&self.reclaimer);
        request.set_completion_routine(Box::new(move |request, params| {
            reclaimer.on_complete(request, params);
        }));

        match target.send(request, SendOptions::default()) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                metrics::record_submitted(ForwardMode::CompletionIntercepted.as_str());
                metrics::set_in_flight(self.in_flight.len());
                trace!(
                    "Request {} sent to {} with completion routine",
                    id,
                    target.name()
                );
                ForwardOutcome::Submitted
            }
            Err(mut rejected) => {
                self.in_flight.remove(&id);
                rejected.request.take_completion_routine();
                self.complete_rejected(rejected, target, ForwardMode::CompletionIntercepted)
            }
        }
    }

    fn complete_rejected(
        &self,
        rejected: Rejected,
        target: &dyn ForwardTarget,
        mode: ForwardMode,
    ) -> ForwardOutcome {
        let Rejected { request, status } = rejected;

        warn!(
            "Send of request {} to {} failed: {}",
            request.id(),
            target.name(),
            status
        );
        self.completed_locally.fetch_add(1, Ordering::Relaxed);
        metrics::record_rejected(mode.as_str());

        request.complete(status);
        ForwardOutcome::CompletedLocally(status)
    }

    /// Intercepted requests still awaiting completion
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn reclaimer(&self) -> &Arc<CompletionReclaimer> {
        &self.reclaimer
    }

    pub fn stats(&self) -> ForwardStats {
        ForwardStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed_locally: self.completed_locally.load(Ordering::Relaxed),
            reclaimed: self.reclaimer.reclaimed(),
            in_flight: self.in_flight.len(),
        }
    }
}

impl Default for ForwardingEngine {
    fn default() -> Self {
        Self::new()
    }
}
