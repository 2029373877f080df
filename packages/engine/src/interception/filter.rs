// packages/engine/src/interception/filter.rs
//! Filter device: per-device request entry points
//!
//! One handler per request family, mirroring the queue callbacks a host
//! framework delivers to a filter. Every handler classifies (which may
//! capture) and then forwards to the device's default target with the
//! configured mode.

use crate::capture::CaptureBuffer;
use crate::interception::classifier::RequestClassifier;
use crate::interception::dispatch_table::DispatchTable;
use crate::interception::forwarder::{ForwardMode, ForwardOutcome, ForwardingEngine};
use crate::request::{MajorFunction, Request, Status};
use crate::target::ForwardTarget;
use crate::utils::config::EngineConfig;
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Local handler for device control codes, run before forwarding.
///
/// Returning a failure status completes the request here with that status
/// instead of forwarding it.
pub type ControlCodeHandler = Box<dyn Fn(u32, &Request) -> Status + Send + Sync>;

/// Filter device
pub struct FilterDevice {
    classifier: RequestClassifier,
    engine: ForwardingEngine,
    target: Arc<dyn ForwardTarget>,
    mode: ForwardMode,
    control_handler: Option<ControlCodeHandler>,
}

impl FilterDevice {
    pub fn new(
        classifier: RequestClassifier,
        target: Arc<dyn ForwardTarget>,
        mode: ForwardMode,
    ) -> Self {
        info!(
            "Filter device attached to {} ({})",
            target.name(),
            mode.as_str()
        );

        Self {
            classifier,
            engine: ForwardingEngine::new(),
            target,
            mode,
            control_handler: None,
        }
    }

    /// Build a filter device from configuration
    pub fn from_config(config: &EngineConfig, target: Arc<dyn ForwardTarget>) -> Result<Self> {
        let capture = Arc::new(CaptureBuffer::new(
            config.capture.capacity,
            config.capture.slot_size,
        )?);

        let table = DispatchTable::with_defaults_for(config.dispatch.submit_control_code);
        for entry in &config.dispatch.transfer_overrides {
            table.set_transfer_policy(entry.function, entry.policy);
        }
        for entry in &config.dispatch.major_overrides {
            table.set_major_policy(MajorFunction::from_code(entry.major), entry.policy);
        }

        let classifier = RequestClassifier::new(Arc::new(table), capture);
        Ok(Self::new(classifier, target, config.forwarding.mode))
    }

    /// Install a local device control handler
    pub fn with_control_handler(mut self, handler: ControlCodeHandler) -> Self {
        self.control_handler = Some(handler);
        self
    }

    pub fn mode(&self) -> ForwardMode {
        self.mode
    }

    pub fn classifier(&self) -> &RequestClassifier {
        &self.classifier
    }

    pub fn capture(&self) -> &Arc<CaptureBuffer> {
        self.classifier.capture()
    }

    pub fn engine(&self) -> &ForwardingEngine {
        &self.engine
    }

    pub fn target(&self) -> &Arc<dyn ForwardTarget> {
        &self.target
    }

    /// Route a request to the handler for its major function
    pub fn dispatch(&self, request: Request) -> ForwardOutcome {
        match request.major_function() {
            MajorFunction::Read => self.on_read(request),
            MajorFunction::DeviceControl => self.on_device_control(request),
            MajorFunction::InternalDeviceControl => self.on_internal_device_control(request),
            _ => self.on_default(request),
        }
    }

    /// Requests with no dedicated handler
    pub fn on_default(&self, request: Request) -> ForwardOutcome {
        self.classify_and_forward(request)
    }

    pub fn on_read(&self, request: Request) -> ForwardOutcome {
        self.classify_and_forward(request)
    }

    /// Internal device control: the only path where payloads are captured
    pub fn on_internal_device_control(&self, request: Request) -> ForwardOutcome {
        self.classify_and_forward(request)
    }

    pub fn on_device_control(&self, request: Request) -> ForwardOutcome {
        if let (Some(handler), Some(code)) = (
            self.control_handler.as_ref(),
            request.parameters().io_control_code(),
        ) {
            let status = handler(code, &request);
            if !status.is_success() {
                debug!(
                    "Control code 0x{:08x} handled locally with {}",
                    code, status
                );
                request.complete(status);
                return ForwardOutcome::CompletedLocally(status);
            }
        }

        self.classify_and_forward(request)
    }

    fn classify_and_forward(&self, request: Request) -> ForwardOutcome {
        let disposition = self.classifier.classify(&request);
        debug!(
            "Request {} ({}) -> {}{}",
            request.id(),
            request.major_function(),
            disposition.policy.as_str(),
            if disposition.captured() { " [captured]" } else { "" }
        );

        self.engine.forward(request, self.target.as_ref(), self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::codes::URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER;
    use crate::request::{Direction, TransferBlock};
    use crate::target::{LoopbackConfig, LoopbackTarget};

    fn filter(mode: ForwardMode, target: Arc<LoopbackTarget>) -> FilterDevice {
        let classifier = RequestClassifier::new(
            Arc::new(DispatchTable::with_defaults()),
            Arc::new(CaptureBuffer::default()),
        );
        FilterDevice::new(classifier, target, mode)
    }

    fn mouse_report(bytes: [u8; 8]) -> TransferBlock {
        TransferBlock::new(
            URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
            Direction::In,
            bytes.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_mouse_report_captured_and_forwarded() {
        let target = Arc::new(LoopbackTarget::new(LoopbackConfig::default()));
        let device = filter(ForwardMode::FireAndForget, Arc::clone(&target));

        let (request, handle) = Request::submit_transfer(mouse_report([1, 2, 3, 4, 5, 6, 7, 8]));
        let outcome = device.dispatch(request);

        assert_eq!(outcome, ForwardOutcome::Submitted);
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
        assert_eq!(device.capture().cursor(), 0);
        assert_eq!(device.capture().slot(0).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_every_handler_forwards() {
        let target = Arc::new(LoopbackTarget::new(LoopbackConfig::default()));
        let device = filter(ForwardMode::CompletionIntercepted, Arc::clone(&target));

        let (read, h1) = Request::read(8);
        let (write, h2) = Request::write(vec![1u8; 3]);
        let (ioctl, h3) = Request::device_control(0x0022_0004, vec![], 0);
        let (other, h4) = Request::other(0x1b, vec![]);

        for request in [read, write, ioctl, other] {
            assert_eq!(device.dispatch(request), ForwardOutcome::Submitted);
        }
        for handle in [h1, h2, h3, h4] {
            assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
        }

        assert_eq!(target.stats().accepted, 4);
        assert_eq!(device.engine().stats().reclaimed, 4);
        assert!(device.capture().is_empty());
    }

    #[tokio::test]
    async fn test_control_handler_failure_completes_locally() {
        let target = Arc::new(LoopbackTarget::new(LoopbackConfig::default()));
        let device = filter(ForwardMode::FireAndForget, Arc::clone(&target))
            .with_control_handler(Box::new(|code, _request| {
                if code == 0xdead {
                    Status::INVALID_DEVICE_STATE
                } else {
                    Status::SUCCESS
                }
            }));

        let (blocked, h1) = Request::device_control(0xdead, vec![], 0);
        let (allowed, h2) = Request::device_control(0xbeef, vec![], 0);

        assert_eq!(
            device.on_device_control(blocked),
            ForwardOutcome::CompletedLocally(Status::INVALID_DEVICE_STATE)
        );
        assert_eq!(device.on_device_control(allowed), ForwardOutcome::Submitted);

        assert_eq!(h1.wait().await.unwrap(), Status::INVALID_DEVICE_STATE);
        assert_eq!(h2.wait().await.unwrap(), Status::SUCCESS);
        assert_eq!(target.stats().accepted, 1);
    }

    #[test]
    fn test_from_config() {
        let mut config = EngineConfig::default();
        config.capture.capacity = 16;
        config.forwarding.mode = ForwardMode::CompletionIntercepted;

        let target: Arc<dyn ForwardTarget> =
            Arc::new(LoopbackTarget::new(LoopbackConfig::default()));
        let device = FilterDevice::from_config(&config, target).unwrap();

        assert_eq!(device.capture().capacity(), 16);
        assert_eq!(device.mode(), ForwardMode::CompletionIntercepted);
    }
}
