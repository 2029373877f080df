// packages/engine/src/main.rs
//! Interpose demo daemon
//!
//! Attaches a filter device to an in-process loopback lower layer, drives a
//! synthetic pointing-device workload through it and dumps the captured
//! report history.

use anyhow::{Context, Result};
use futures::future::join_all;
use interpose_engine::capture::Exporter;
use interpose_engine::interception::FilterDevice;
use interpose_engine::observability::{init_metrics, init_tracing};
use interpose_engine::request::codes::{
    URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER, URB_FUNCTION_CONTROL_TRANSFER,
};
use interpose_engine::request::{Direction, Request, Status, TransferBlock};
use interpose_engine::runtime::IoQueue;
use interpose_engine::target::{ForwardTarget, LoopbackTarget};
use interpose_engine::utils::config::EngineConfig;
use interpose_engine::{BuildInfo, CompletionHandle};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load().context("failed to load configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    let build = BuildInfo::current();
    info!(
        "Starting Interpose Engine v{} ({}, {})",
        build.version, build.git_hash, build.rustc_version
    );
    info!("Configuration loaded: {:?}", config);

    let target = Arc::new(LoopbackTarget::new(config.simulation.loopback_config()));
    let lower: Arc<dyn ForwardTarget> = target.clone();
    let device = Arc::new(FilterDevice::from_config(&config, lower)?);
    info!("Dispatch table:\n{}", device.classifier().table().export_config());

    let queue = IoQueue::new(Arc::clone(&device), config.dispatch.queue)?;

    // Drive the synthetic workload
    let mut handles = Vec::with_capacity(config.simulation.requests);
    {
        let mut rng = rand::thread_rng();
        for _ in 0..config.simulation.requests {
            let (request, handle) = synthetic_request(&mut rng);
            queue.submit(request)?;
            handles.push(handle);
        }
    }
    info!("Submitted {} requests", handles.len());

    queue.shutdown().await;

    let mut statuses: HashMap<Status, usize> = HashMap::new();
    let mut abandoned = 0usize;
    for result in join_all(handles.into_iter().map(|handle| handle.wait())).await {
        match result {
            Ok(status) => *statuses.entry(status).or_default() += 1,
            Err(e) => {
                warn!("{}", e);
                abandoned += 1;
            }
        }
    }
    target.shutdown();

    for (status, count) in &statuses {
        info!("Completed with {}: {}", status, count);
    }
    if abandoned > 0 {
        warn!("{} requests were never completed", abandoned);
    }

    let forwarding = device.engine().stats();
    let lower_stats = target.stats();
    let capture = device.capture();
    info!(
        "Forwarding: submitted={} completed_locally={} reclaimed={} in_flight={}",
        forwarding.submitted,
        forwarding.completed_locally,
        forwarding.reclaimed,
        forwarding.in_flight
    );
    info!(
        "Loopback: accepted={} rejected={} completed={}",
        lower_stats.accepted, lower_stats.rejected, lower_stats.completed
    );
    info!(
        "Capture: recorded={} skipped={} cursor={}",
        capture.total_recorded(),
        capture.skipped(),
        capture.cursor()
    );

    // Dump the capture history
    let exporter = Exporter::new(config.simulation.dump_format);
    let snapshot = capture.snapshot();
    match &config.simulation.dump_path {
        Some(path) => exporter.export_to_file(&snapshot, path)?,
        None => println!("{}", exporter.export(&snapshot)?),
    }

    Ok(())
}

/// One request from the synthetic mix: mostly inbound mouse reports, with
/// outbound transfers, odd-sized reports, control transfers and reads.
fn synthetic_request(rng: &mut impl Rng) -> (Request, CompletionHandle) {
    match rng.gen_range(0..100u32) {
        0..=69 => {
            let mut report = [0u8; 8];
            rng.fill(&mut report[..]);
            Request::submit_transfer(TransferBlock::new(
                URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
                Direction::In,
                report.to_vec(),
            ))
        }
        70..=79 => Request::submit_transfer(TransferBlock::new(
            URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
            Direction::Out,
            vec![0u8; 8],
        )),
        80..=84 => {
            let len = rng.gen_range(9..=64usize);
            Request::submit_transfer(TransferBlock::new(
                URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
                Direction::In,
                vec![0xa5u8; len],
            ))
        }
        85..=94 => Request::submit_transfer(TransferBlock::new(
            URB_FUNCTION_CONTROL_TRANSFER,
            Direction::In,
            vec![0u8; 8],
        )),
        _ => Request::read(8),
    }
}
