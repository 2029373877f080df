// packages/engine/src/observability/metrics.rs
//! Metric names and recording helpers
//!
//! Recording is a no-op until a recorder is installed by `init_metrics`.

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const REQUESTS_CLASSIFIED: &str = "interpose_requests_classified_total";
pub const PAYLOADS_CAPTURED: &str = "interpose_payloads_captured_total";
pub const CAPTURES_SKIPPED: &str = "interpose_captures_skipped_total";
pub const REQUESTS_SUBMITTED: &str = "interpose_requests_submitted_total";
pub const REQUESTS_REJECTED: &str = "interpose_requests_rejected_total";
pub const REQUESTS_RECLAIMED: &str = "interpose_requests_reclaimed_total";
pub const REQUESTS_IN_FLIGHT: &str = "interpose_requests_in_flight";

/// Register descriptions with the installed recorder
pub fn describe() {
    describe_counter!(REQUESTS_CLASSIFIED, "Requests classified, by policy");
    describe_counter!(PAYLOADS_CAPTURED, "Payloads written to the capture buffer");
    describe_counter!(
        CAPTURES_SKIPPED,
        "Capture-eligible requests whose payload did not qualify"
    );
    describe_counter!(REQUESTS_SUBMITTED, "Requests accepted by the forward target, by mode");
    describe_counter!(
        REQUESTS_REJECTED,
        "Requests rejected synchronously and completed locally"
    );
    describe_counter!(
        REQUESTS_RECLAIMED,
        "Intercepted requests finalized by the completion reclaimer"
    );
    describe_gauge!(REQUESTS_IN_FLIGHT, "Intercepted requests awaiting completion");
}

pub fn record_classified(policy: &'static str) {
    counter!(REQUESTS_CLASSIFIED, "policy" => policy).increment(1);
}

pub fn record_capture(captured: bool) {
    if captured {
        counter!(PAYLOADS_CAPTURED).increment(1);
    } else {
        counter!(CAPTURES_SKIPPED).increment(1);
    }
}

pub fn record_submitted(mode: &'static str) {
    counter!(REQUESTS_SUBMITTED, "mode" => mode).increment(1);
}

pub fn record_rejected(mode: &'static str) {
    counter!(REQUESTS_REJECTED, "mode" => mode).increment(1);
}

pub fn record_reclaimed() {
    counter!(REQUESTS_RECLAIMED).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(REQUESTS_IN_FLIGHT).set(count as f64);
}
