// packages/engine/src/interception/classifier.rs
//! Request classifier
//!
//! Looks up a request's policy and, for capture-eligible requests, copies a
//! qualifying payload into the capture buffer before the request is
//! forwarded. A payload qualifies when the transfer is inbound (device to
//! caller) and exactly one slot long. Classification never fails.

use crate::capture::CaptureBuffer;
use crate::interception::dispatch_table::{DispatchTable, Policy};
use crate::observability::metrics;
use crate::request::{codes, Direction, Request, TransferBlock};
use std::sync::Arc;
use tracing::{debug, trace};

/// Result of classifying one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    /// Policy that was applied
    pub policy: Policy,

    /// Slot the payload was captured into, if any
    pub captured_slot: Option<usize>,
}

impl Disposition {
    pub fn pass_through() -> Self {
        Self {
            policy: Policy::PassThrough,
            captured_slot: None,
        }
    }

    pub fn captured(&self) -> bool {
        self.captured_slot.is_some()
    }
}

/// Request classifier
pub struct RequestClassifier {
    table: Arc<DispatchTable>,
    capture: Arc<CaptureBuffer>,
}

impl RequestClassifier {
    pub fn new(table: Arc<DispatchTable>, capture: Arc<CaptureBuffer>) -> Self {
        Self { table, capture }
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    pub fn capture(&self) -> &Arc<CaptureBuffer> {
        &self.capture
    }

    /// Payload size a transfer must have to be captured
    pub fn expected_length(&self) -> usize {
        self.capture.slot_size()
    }

    /// Whether a capture-eligible transfer's payload qualifies
    pub fn qualifies(&self, transfer: &TransferBlock) -> bool {
        transfer.len() == self.expected_length() && transfer.direction() == Direction::In
    }

    // Direction is filtered here; length is left to the buffer so that
    // mismatches show up in its skip count.
    fn try_capture(&self, transfer: &TransferBlock) -> Option<usize> {
        if transfer.direction() != Direction::In {
            return None;
        }
        let slot = self.capture.try_record(&transfer.buffer).ok();
        metrics::record_capture(slot.is_some());
        slot
    }

    /// Classify a request, capturing its payload when it qualifies
    pub fn classify(&self, request: &Request) -> Disposition {
        let parameters = request.parameters();
        let policy = self.table.lookup(parameters);
        metrics::record_classified(policy.as_str());

        match policy {
            Policy::PassThrough => Disposition::pass_through(),

            Policy::InspectOther => {
                debug!(
                    "Inspected request {} ({}, control code {:?}, {} payload bytes)",
                    request.id(),
                    request.major_function(),
                    parameters.io_control_code(),
                    parameters.payload().len()
                );
                Disposition {
                    policy,
                    captured_slot: None,
                }
            }

            Policy::InspectCapture => {
                let captured_slot = parameters
                    .transfer()
                    .and_then(|transfer| self.try_capture(transfer));

                match (captured_slot, parameters.transfer()) {
                    (Some(slot), _) => {
                        trace!("Request {} captured into slot {}", request.id(), slot)
                    }
                    (None, Some(transfer)) => trace!(
                        "Request {} not captured: {} {:?} bytes={}",
                        request.id(),
                        codes::transfer_function_name(transfer.function),
                        transfer.direction(),
                        transfer.len()
                    ),
                    (None, None) => {
                        trace!("Request {} has no transfer block to capture", request.id())
                    }
                }

                Disposition {
                    policy,
                    captured_slot,
                }
            }
        }
    }
}
