// packages/engine/src/target/loopback.rs
//! Loopback target: a simulated lower layer
//!
//! Requests are queued on a bounded channel and completed by worker threads,
//! so completions arrive on threads unrelated to the submitter.
//!
//! # Architecture
//!
//! ```text
//! send() ──try_send──► [bounded queue] ──► worker 0 ──► request.complete(status)
//!   │                                 └──► worker 1 ──► request.complete(status)
//!   └─ full / closed / forced ──► Rejected { request, status }
//! ```

use crate::request::{Request, Status};
use crate::target::{ForwardTarget, Rejected, SendOptions};
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Loopback target configuration
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Number of completion worker threads
    pub workers: usize,

    /// Maximum queued (accepted but not yet completed) requests
    pub queue_depth: usize,

    /// Base completion latency
    pub latency: Duration,

    /// Random extra latency, up to this bound
    pub jitter: Duration,

    /// Status every accepted request completes with
    pub completion_status: Status,

    /// Reject every send synchronously with this status
    pub reject_status: Option<Status>,

    /// Keep a copy of every payload received
    pub record_payloads: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 64,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            completion_status: Status::SUCCESS,
            reject_status: None,
            record_payloads: true,
        }
    }
}

#[derive(Default)]
struct Shared {
    accepted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    observed: Mutex<Vec<Bytes>>,
}

/// In-process lower layer
pub struct LoopbackTarget {
    config: LoopbackConfig,
    sender: RwLock<Option<Sender<Request>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl LoopbackTarget {
    /// Create the target and start its workers
    pub fn new(config: LoopbackConfig) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = bounded(config.queue_depth.max(1));
        let shared = Arc::new(Shared::default());

        let handles = (0..workers)
            .filter_map(|i| {
                let rx = rx.clone();
                let shared = Arc::clone(&shared);
                let config = config.clone();
                std::thread::Builder::new()
                    .name(format!("loopback-{}", i))
                    .spawn(move || worker_loop(i, rx, shared, config))
                    .map_err(|e| error!("Failed to spawn loopback worker {}: {}", i, e))
                    .ok()
            })
            .collect();

        info!(
            "Loopback target started with {} workers, queue depth {}",
            workers, config.queue_depth
        );

        Self {
            config,
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
            shared,
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Payloads seen by this target, in submission order
    pub fn observed_payloads(&self) -> Vec<Bytes> {
        self.shared.observed.lock().clone()
    }

    pub fn stats(&self) -> LoopbackStats {
        LoopbackStats {
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting requests and wait for queued ones to complete
    pub fn shutdown(&self) {
        if self.sender.write().take().is_none() {
            return;
        }

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Loopback worker panicked");
            }
        }

        info!("Loopback target stopped");
    }

    fn reject(&self, request: Request, status: Status) -> Result<(), Rejected> {
        self.shared.rejected.fetch_add(1, Ordering::Relaxed);
        debug!("Loopback rejected request {} with {}", request.id(), status);
        Err(Rejected::new(request, status))
    }
}

impl ForwardTarget for LoopbackTarget {
    fn name(&self) -> &str {
        "loopback"
    }

    fn send(&self, request: Request, options: SendOptions) -> Result<(), Rejected> {
        if let Some(status) = self.config.reject_status {
            return self.reject(request, status);
        }

        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            return self.reject(request, Status::DEVICE_NOT_CONNECTED);
        };

        let payload = self.config.record_payloads.then(|| request.payload());
        let id = request.id();

        match sender.try_send(request) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::Relaxed);
                if let Some(payload) = payload {
                    self.shared.observed.lock().push(payload);
                }
                trace!(
                    "Loopback accepted request {} (send_and_forget={})",
                    id,
                    options.send_and_forget
                );
                Ok(())
            }
            Err(TrySendError::Full(request)) => {
                self.reject(request, Status::INSUFFICIENT_RESOURCES)
            }
            Err(TrySendError::Disconnected(request)) => {
                self.reject(request, Status::DEVICE_NOT_CONNECTED)
            }
        }
    }
}

impl Drop for LoopbackTarget {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, rx: Receiver<Request>, shared: Arc<Shared>, config: LoopbackConfig) {
    debug!("Loopback worker {} running", index);

    for request in rx.iter() {
        let delay = completion_delay(&config);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        trace!(
            "Loopback worker {} completing request {} with {}",
            index,
            request.id(),
            config.completion_status
        );
        shared.completed.fetch_add(1, Ordering::Relaxed);
        request.complete(config.completion_status);
    }

    debug!("Loopback worker {} exiting", index);
}

fn completion_delay(config: &LoopbackConfig) -> Duration {
    if config.jitter.is_zero() {
        return config.latency;
    }
    let jitter_us = config.jitter.as_micros() as u64;
    config.latency + Duration::from_micros(rand::thread_rng().gen_range(0..=jitter_us))
}

/// Loopback target counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    pub accepted: u64,
    pub rejected: u64,
    pub completed: u64,
}
