// packages/engine/tests/filter_stack.rs
//! End-to-end scenarios: requests through a filter device to a loopback
//! lower layer, checking what callers observe and what gets captured.

use bytes::Bytes;
use interpose_engine::capture::CaptureBuffer;
use interpose_engine::interception::{
    DispatchTable, FilterDevice, ForwardMode, ForwardOutcome, RequestClassifier,
};
use interpose_engine::request::codes::{
    URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER, URB_FUNCTION_CONTROL_TRANSFER,
};
use interpose_engine::request::{Direction, Request, Status, TransferBlock};
use interpose_engine::runtime::{DispatchType, IoQueue};
use interpose_engine::target::{LoopbackConfig, LoopbackTarget};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn attach(
    mode: ForwardMode,
    config: LoopbackConfig,
) -> (Arc<FilterDevice>, Arc<LoopbackTarget>) {
    let target = Arc::new(LoopbackTarget::new(config));
    let classifier = RequestClassifier::new(
        Arc::new(DispatchTable::with_defaults()),
        Arc::new(CaptureBuffer::default()),
    );
    let device = Arc::new(FilterDevice::new(classifier, target.clone(), mode));
    (device, target)
}

fn inbound_report(payload: impl Into<Bytes>) -> TransferBlock {
    TransferBlock::new(
        URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
        Direction::In,
        payload,
    )
}

#[tokio::test]
async fn test_single_report_lands_in_slot_zero() {
    for mode in [ForwardMode::FireAndForget, ForwardMode::CompletionIntercepted] {
        let (device, _target) = attach(mode, LoopbackConfig::default());

        let report = inbound_report(vec![1u8, 2, 3, 4, 5, 6, 7, 8]);
        let (request, handle) = Request::submit_transfer(report);
        assert_eq!(device.dispatch(request), ForwardOutcome::Submitted);
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);

        let capture = device.capture();
        assert_eq!(capture.cursor(), 0);
        assert_eq!(capture.slot(0).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(capture.total_recorded(), 1);
    }
}

#[tokio::test]
async fn test_history_wraps_after_capacity() {
    let (device, _target) = attach(
        ForwardMode::FireAndForget,
        LoopbackConfig {
            queue_depth: 512,
            ..Default::default()
        },
    );

    let mut handles = Vec::new();
    for n in 1..=256u64 {
        let report = inbound_report(n.to_le_bytes().to_vec());
        let (request, handle) = Request::submit_transfer(report);
        device.dispatch(request);
        handles.push(handle);
    }
    for handle in handles {
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
    }

    let capture = device.capture();
    assert_eq!(capture.cursor(), 0);
    assert_eq!(capture.slot(0).unwrap(), 256u64.to_le_bytes().to_vec());
    assert_eq!(capture.slot(1).unwrap(), 2u64.to_le_bytes().to_vec());
    assert_eq!(capture.slot(254).unwrap(), 255u64.to_le_bytes().to_vec());
    assert_eq!(capture.len(), 255);
}

#[tokio::test]
async fn test_non_qualifying_transfers_leave_history_alone() {
    let (device, _target) = attach(ForwardMode::FireAndForget, LoopbackConfig::default());

    let outbound = TransferBlock::new(
        URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
        Direction::Out,
        vec![7u8; 8],
    );
    let short = inbound_report(vec![7u8; 4]);
    let control = TransferBlock::new(
        URB_FUNCTION_CONTROL_TRANSFER,
        Direction::In,
        vec![7u8; 8],
    );

    for transfer in [outbound, short, control] {
        let (request, handle) = Request::submit_transfer(transfer);
        device.dispatch(request);
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
    }

    assert!(device.capture().is_empty());
    assert_eq!(device.capture().cursor(), device.capture().capacity() - 1);
    assert_eq!(device.capture().skipped(), 1);
}

#[tokio::test]
async fn test_synchronous_rejection_reaches_caller() {
    for mode in [ForwardMode::FireAndForget, ForwardMode::CompletionIntercepted] {
        let (device, target) = attach(
            mode,
            LoopbackConfig {
                reject_status: Some(Status::NO_SUCH_DEVICE),
                ..Default::default()
            },
        );

        let (request, handle) = Request::submit_transfer(inbound_report(vec![3u8; 8]));
        assert_eq!(
            device.dispatch(request),
            ForwardOutcome::CompletedLocally(Status::NO_SUCH_DEVICE)
        );
        assert_eq!(handle.wait().await.unwrap(), Status::NO_SUCH_DEVICE);

        let stats = device.engine().stats();
        assert_eq!(stats.reclaimed, 0);
        assert_eq!(stats.completed_locally, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(target.stats().rejected, 1);

        // Classification ran before the send
        assert_eq!(device.capture().total_recorded(), 1);
    }
}

#[tokio::test]
async fn test_intercepted_completion_is_reclaimed_once() {
    let (device, target) = attach(
        ForwardMode::CompletionIntercepted,
        LoopbackConfig {
            completion_status: Status::CANCELLED,
            queue_depth: 128,
            ..Default::default()
        },
    );

    let mut handles = Vec::new();
    for _ in 0..50 {
        let (request, handle) = Request::read(8);
        device.dispatch(request);
        handles.push(handle);
    }
    for handle in handles {
        assert_eq!(handle.wait().await.unwrap(), Status::CANCELLED);
    }
    target.shutdown();

    let stats = device.engine().stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.reclaimed, 50);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(target.stats().completed, 50);
}

#[tokio::test]
async fn test_pass_through_is_transparent() {
    let (device, target) = attach(ForwardMode::CompletionIntercepted, LoopbackConfig::default());

    let payloads: Vec<Vec<u8>> = vec![vec![0xde, 0xad, 0xbe, 0xef], vec![], vec![1u8; 8]];
    for payload in &payloads {
        let (request, handle) = Request::submit_transfer(TransferBlock::new(
            URB_FUNCTION_CONTROL_TRANSFER,
            Direction::In,
            payload.clone(),
        ));
        device.dispatch(request);
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
    }

    let observed: Vec<Vec<u8>> = target
        .observed_payloads()
        .into_iter()
        .map(|b| b.to_vec())
        .collect();
    assert_eq!(observed, payloads);
    assert!(device.capture().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_captures_get_distinct_slots() {
    const K: u64 = 200;

    let (device, target) = attach(
        ForwardMode::CompletionIntercepted,
        LoopbackConfig {
            workers: 4,
            queue_depth: 1024,
            ..Default::default()
        },
    );
    let queue = IoQueue::new(Arc::clone(&device), DispatchType::Parallel).unwrap();

    let mut handles = Vec::new();
    for n in 0..K {
        let report = inbound_report(n.to_le_bytes().to_vec());
        let (request, handle) = Request::submit_transfer(report);
        queue.submit(request).unwrap();
        handles.push(handle);
    }
    queue.shutdown().await;
    for handle in handles {
        assert_eq!(handle.wait().await.unwrap(), Status::SUCCESS);
    }

    let capture = device.capture();
    assert_eq!(capture.total_recorded(), K);

    let captured: HashSet<Vec<u8>> = capture.history().into_iter().collect();
    let expected: HashSet<Vec<u8>> = (0..K).map(|n| n.to_le_bytes().to_vec()).collect();
    assert_eq!(captured, expected);

    assert_eq!(device.engine().stats().reclaimed, K);
    assert_eq!(target.stats().accepted, K);
}

proptest! {
    #[test]
    fn prop_history_is_last_qualifying_payloads(
        capacity in 1usize..16,
        writes in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..12), any::<bool>()),
            0..64,
        ),
    ) {
        let classifier = RequestClassifier::new(
            Arc::new(DispatchTable::with_defaults()),
            Arc::new(CaptureBuffer::new(capacity, 8).unwrap()),
        );

        let mut qualifying = Vec::new();
        for (payload, inbound) in writes {
            let direction = if inbound { Direction::In } else { Direction::Out };
            if inbound && payload.len() == 8 {
                qualifying.push(payload.clone());
            }

            let (request, _handle) = Request::submit_transfer(TransferBlock::new(
                URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
                direction,
                payload,
            ));
            classifier.classify(&request);
            request.complete(Status::SUCCESS);
        }

        let capture = classifier.capture();
        let kept = qualifying.len().min(capacity);
        let expected = qualifying[qualifying.len() - kept..].to_vec();

        prop_assert_eq!(capture.history(), expected);
        prop_assert_eq!(capture.total_recorded(), qualifying.len() as u64);
        prop_assert_eq!(capture.cursor(), (qualifying.len() + capacity - 1) % capacity);
    }
}
