// packages/engine/src/runtime/io_queue.rs
//! I/O queue delivering requests to a filter device
//!
//! # Architecture
//!
//! ```text
//! Parallel:    submit() ──spawn──► task ──► FilterDevice::dispatch
//!              submit() ──spawn──► task ──► FilterDevice::dispatch
//!
//! Sequential:  submit() ──► [mpsc] ──► single worker ──► FilterDevice::dispatch
//!                                      (arrival order)
//! ```
//!
//! Parallel dispatch puts no ordering or exclusion between requests, so the
//! device's handlers run concurrently on the runtime's worker threads.

use crate::interception::FilterDevice;
use crate::request::Request;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// How requests are handed to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchType {
    /// One task per request, no serialization
    #[default]
    Parallel,

    /// A single task in arrival order
    Sequential,
}

impl DispatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchType::Parallel => "parallel",
            DispatchType::Sequential => "sequential",
        }
    }
}

struct Shared {
    device: Arc<FilterDevice>,
    dispatched: AtomicU64,
    active: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn dispatch(&self, request: Request) {
        self.device.dispatch(request);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_one(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

fn closed(request: &Request) -> EngineError {
    EngineError::DispatchFailed(format!("queue closed, dropping request {}", request.id()))
}

/// I/O queue
pub struct IoQueue {
    dispatch_type: DispatchType,
    runtime: Handle,
    shared: Arc<Shared>,
    closed: AtomicBool,
    sender: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IoQueue {
    /// Create a queue for `device`. Must be called from within a tokio runtime.
    pub fn new(device: Arc<FilterDevice>, dispatch_type: DispatchType) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| EngineError::DispatchFailed(format!("no tokio runtime: {}", e)))?;

        let shared = Arc::new(Shared {
            device,
            dispatched: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let (sender, worker) = match dispatch_type {
            DispatchType::Parallel => (None, None),
            DispatchType::Sequential => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
                let worker_shared = Arc::clone(&shared);
                let worker = runtime.spawn(async move {
                    while let Some(request) = rx.recv().await {
                        worker_shared.dispatch(request);
                    }
                    debug!("Sequential dispatch worker exiting");
                });
                (Some(tx), Some(worker))
            }
        };

        info!("I/O queue created ({} dispatch)", dispatch_type.as_str());

        Ok(Self {
            dispatch_type,
            runtime,
            shared,
            closed: AtomicBool::new(false),
            sender: Mutex::new(sender),
            worker: Mutex::new(worker),
        })
    }

    pub fn dispatch_type(&self) -> DispatchType {
        self.dispatch_type
    }

    pub fn device(&self) -> &Arc<FilterDevice> {
        &self.shared.device
    }

    /// Requests handed to the device so far
    pub fn dispatched(&self) -> u64 {
        self.shared.dispatched.load(Ordering::Relaxed)
    }

    /// Queue a request for delivery.
    ///
    /// After shutdown the request is dropped, and its caller observes an
    /// abandoned request.
    pub fn submit(&self, request: Request) -> Result<()> {
        match self.dispatch_type {
            DispatchType::Parallel => self.submit_parallel(request),
            DispatchType::Sequential => self.submit_sequential(request),
        }
    }

    fn submit_parallel(&self, request: Request) -> Result<()> {
        // Counted before `closed` is checked, while shutdown sets `closed`
        // before it reads the count: at least one side sees the other.
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.shared.finish_one();
            return Err(closed(&request));
        }

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            shared.dispatch(request);
            shared.finish_one();
        });
        Ok(())
    }

    fn submit_sequential(&self, request: Request) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed(&request));
        }

        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(closed(&request));
        };
        sender.send(request).map_err(|e| {
            EngineError::DispatchFailed(format!(
                "dispatch worker gone, dropping request {}",
                e.0.id()
            ))
        })
    }

    /// Stop accepting requests and wait until every queued one has been
    /// handed to the device
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.sender.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Sequential dispatch worker failed: {}", e);
            }
        }

        loop {
            let idle = self.shared.idle.notified();
            if self.shared.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }

        info!("I/O queue stopped after {} requests", self.dispatched());
    }
}
