// packages/engine/src/request/io_request.rs
//! The I/O request object
//!
//! A `Request` carries a stack of parameter views. The top of the stack is
//! what the current owner sees. Formatting a request for the next layer
//! pushes an equivalent copy; when a registered completion routine is invoked
//! the lower view is popped again so the routine sees the caller's view.

use crate::request::codes::{Direction, MajorFunction, Status, IOCTL_INTERNAL_USB_SUBMIT_URB};
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::warn;
use ulid::Ulid;

/// Unique request identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}", self.0)
    }
}

/// Transfer block carried by an internal device control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferBlock {
    /// Transfer function code
    pub function: u16,

    /// Transfer flags (direction bit included)
    pub transfer_flags: u32,

    /// Transfer buffer
    pub buffer: Bytes,
}

impl TransferBlock {
    pub fn new(function: u16, direction: Direction, buffer: impl Into<Bytes>) -> Self {
        Self {
            function,
            transfer_flags: direction.transfer_flags(),
            buffer: buffer.into(),
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_transfer_flags(self.transfer_flags)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Type-specific parameters of one stack location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameters {
    Read {
        length: usize,
    },
    Write {
        data: Bytes,
    },
    DeviceControl {
        io_control_code: u32,
        input: Bytes,
        output_length: usize,
    },
    InternalDeviceControl {
        io_control_code: u32,
        transfer: Option<TransferBlock>,
    },
    /// Any other major function, forwarded untouched
    Other {
        major: u8,
        data: Bytes,
    },
}

impl Parameters {
    pub fn major_function(&self) -> MajorFunction {
        match self {
            Parameters::Read { .. } => MajorFunction::Read,
            Parameters::Write { .. } => MajorFunction::Write,
            Parameters::DeviceControl { .. } => MajorFunction::DeviceControl,
            Parameters::InternalDeviceControl { .. } => MajorFunction::InternalDeviceControl,
            Parameters::Other { major, .. } => MajorFunction::from_code(*major),
        }
    }

    /// Control code for (internal) device control requests
    pub fn io_control_code(&self) -> Option<u32> {
        match self {
            Parameters::DeviceControl {
                io_control_code, ..
            }
            | Parameters::InternalDeviceControl {
                io_control_code, ..
            } => Some(*io_control_code),
            _ => None,
        }
    }

    pub fn transfer(&self) -> Option<&TransferBlock> {
        match self {
            Parameters::InternalDeviceControl { transfer, .. } => transfer.as_ref(),
            _ => None,
        }
    }

    /// Payload bytes visible at this location (empty when there are none)
    pub fn payload(&self) -> Bytes {
        match self {
            Parameters::Read { .. } => Bytes::new(),
            Parameters::Write { data } => data.clone(),
            Parameters::DeviceControl { input, .. } => input.clone(),
            Parameters::InternalDeviceControl { transfer, .. } => transfer
                .as_ref()
                .map(|t| t.buffer.clone())
                .unwrap_or_default(),
            Parameters::Other { data, .. } => data.clone(),
        }
    }
}

/// Parameters handed to a completion routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionParams {
    /// Status reported by the lower layer
    pub status: Status,
}

/// Continuation run when a request is completed below us
pub type CompletionRoutine = Box<dyn FnOnce(Request, CompletionParams) + Send + 'static>;

/// An in-flight I/O request
pub struct Request {
    id: RequestId,
    locations: Vec<Parameters>,
    completion_routine: Option<CompletionRoutine>,
    responder: Option<oneshot::Sender<Status>>,
    received_at: Instant,
}

impl Request {
    /// Create a request and the handle its caller waits on
    pub fn new(parameters: Parameters) -> (Self, CompletionHandle) {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();

        let request = Self {
            id,
            locations: vec![parameters],
            completion_routine: None,
            responder: Some(tx),
            received_at: Instant::now(),
        };

        (
            request,
            CompletionHandle {
                id,
                rx,
                settled: None,
            },
        )
    }

    pub fn read(length: usize) -> (Self, CompletionHandle) {
        Self::new(Parameters::Read { length })
    }

    pub fn write(data: impl Into<Bytes>) -> (Self, CompletionHandle) {
        Self::new(Parameters::Write { data: data.into() })
    }

    pub fn device_control(
        io_control_code: u32,
        input: impl Into<Bytes>,
        output_length: usize,
    ) -> (Self, CompletionHandle) {
        Self::new(Parameters::DeviceControl {
            io_control_code,
            input: input.into(),
            output_length,
        })
    }

    pub fn internal_device_control(
        io_control_code: u32,
        transfer: Option<TransferBlock>,
    ) -> (Self, CompletionHandle) {
        Self::new(Parameters::InternalDeviceControl {
            io_control_code,
            transfer,
        })
    }

    /// Internal device control request submitting a transfer block
    pub fn submit_transfer(transfer: TransferBlock) -> (Self, CompletionHandle) {
        Self::internal_device_control(IOCTL_INTERNAL_USB_SUBMIT_URB, Some(transfer))
    }

    pub fn other(major: u8, data: impl Into<Bytes>) -> (Self, CompletionHandle) {
        Self::new(Parameters::Other {
            major,
            data: data.into(),
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Parameters at the current stack location
    pub fn parameters(&self) -> &Parameters {
        // Never empty: created with one location, and only views pushed by
        // `format_using_current_type` are ever popped.
        &self.locations[self.locations.len() - 1]
    }

    pub fn major_function(&self) -> MajorFunction {
        self.parameters().major_function()
    }

    pub fn payload(&self) -> Bytes {
        self.parameters().payload()
    }

    pub fn stack_depth(&self) -> usize {
        self.locations.len()
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Copy the current location into a fresh one for the next layer
    pub fn format_using_current_type(&mut self) {
        let current = self.parameters().clone();
        self.locations.push(current);
    }

    pub fn set_completion_routine(&mut self, routine: CompletionRoutine) {
        self.completion_routine = Some(routine);
    }

    pub fn take_completion_routine(&mut self) -> Option<CompletionRoutine> {
        self.completion_routine.take()
    }

    pub fn has_completion_routine(&self) -> bool {
        self.completion_routine.is_some()
    }

    /// Complete the request with `status`.
    ///
    /// If a completion routine is registered it runs instead of notifying
    /// the caller, and owns the request from then on.
    pub fn complete(mut self, status: Status) {
        if let Some(routine) = self.completion_routine.take() {
            if self.locations.len() > 1 {
                self.locations.pop();
            }
            routine(self, CompletionParams { status });
            return;
        }

        if let Some(responder) = self.responder.take() {
            // Caller may have stopped waiting; the request is still completed.
            let _ = responder.send(status);
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("parameters", self.parameters())
            .field("stack_depth", &self.locations.len())
            .field("has_completion_routine", &self.completion_routine.is_some())
            .finish()
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.responder.is_some() {
            warn!(
                "Request {} ({}) dropped without completion",
                self.id,
                self.major_function()
            );
        }
    }
}

/// Caller-side handle resolving to the request's final status
#[derive(Debug)]
pub struct CompletionHandle {
    id: RequestId,
    rx: oneshot::Receiver<Status>,

    /// Outcome already taken out of `rx` by `try_status`
    settled: Option<Settled>,
}

#[derive(Debug, Clone, Copy)]
enum Settled {
    Completed(Status),
    Abandoned,
}

impl CompletionHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the request to complete
    pub async fn wait(self) -> Result<Status> {
        let id = self.id;
        match self.settled {
            Some(settled) => settled.into_result(id),
            None => self
                .rx
                .await
                .map_err(|_| EngineError::RequestAbandoned(id.to_string())),
        }
    }

    /// Wait for completion from outside an async context
    pub fn blocking_wait(self) -> Result<Status> {
        let id = self.id;
        match self.settled {
            Some(settled) => settled.into_result(id),
            None => self
                .rx
                .blocking_recv()
                .map_err(|_| EngineError::RequestAbandoned(id.to_string())),
        }
    }

    /// Status if the request has already completed.
    ///
    /// The outcome is kept, so `wait` still returns it afterwards.
    pub fn try_status(&mut self) -> Option<Status> {
        if self.settled.is_none() {
            self.settled = match self.rx.try_recv() {
                Ok(status) => Some(Settled::Completed(status)),
                Err(TryRecvError::Closed) => Some(Settled::Abandoned),
                Err(TryRecvError::Empty) => None,
            };
        }

        match self.settled {
            Some(Settled::Completed(status)) => Some(status),
            _ => None,
        }
    }
}

impl Settled {
    fn into_result(self, id: RequestId) -> Result<Status> {
        match self {
            Settled::Completed(status) => Ok(status),
            Settled::Abandoned => Err(EngineError::RequestAbandoned(id.to_string())),
        }
    }
}
