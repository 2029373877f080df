// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (`INTERPOSE_CONFIG` or `interpose.{toml,yaml,json}` in the working
//! directory), then `INTERPOSE__SECTION__KEY` environment variables.

use crate::capture::{ExportFormat, DEFAULT_CAPACITY, DEFAULT_SLOT_SIZE};
use crate::interception::{ForwardMode, Policy};
use crate::request::codes::IOCTL_INTERNAL_USB_SUBMIT_URB;
use crate::request::Status;
use crate::runtime::DispatchType;
use crate::target::LoopbackConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "INTERPOSE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub forwarding: ForwardingConfig,
    pub dispatch: DispatchConfig,
    pub observability: ObservabilityConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of history slots
    pub capacity: usize,

    /// Bytes per slot, also the payload length that qualifies for capture
    pub slot_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub mode: ForwardMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How the I/O queue hands requests to the filter
    pub queue: DispatchType,

    /// Control code whose requests carry a transfer block
    pub submit_control_code: u32,

    pub transfer_overrides: Vec<TransferOverride>,

    pub major_overrides: Vec<MajorOverride>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue: DispatchType::default(),
            submit_control_code: IOCTL_INTERNAL_USB_SUBMIT_URB,
            transfer_overrides: Vec::new(),
            major_overrides: Vec::new(),
        }
    }
}

/// Policy for one transfer function code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOverride {
    pub function: u16,
    pub policy: Policy,
}

/// Policy for one major function code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorOverride {
    pub major: u8,
    pub policy: Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub log_level: String,

    pub json_logs: bool,

    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

/// Settings for the demo binary's loopback target and workload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub workers: usize,
    pub queue_depth: usize,
    pub latency_us: u64,
    pub jitter_us: u64,
    pub completion_status: Status,
    pub reject_status: Option<Status>,

    /// Number of synthetic requests to submit
    pub requests: usize,

    /// Where to write the capture snapshot; stdout when unset
    pub dump_path: Option<PathBuf>,

    pub dump_format: ExportFormat,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_depth: 256,
            latency_us: 50,
            jitter_us: 200,
            completion_status: Status::SUCCESS,
            reject_status: None,
            requests: 1000,
            dump_path: None,
            dump_format: ExportFormat::default(),
        }
    }
}

impl SimulationConfig {
    pub fn loopback_config(&self) -> LoopbackConfig {
        LoopbackConfig {
            workers: self.workers,
            queue_depth: self.queue_depth,
            latency: Duration::from_micros(self.latency_us),
            jitter: Duration::from_micros(self.jitter_us),
            completion_status: self.completion_status,
            reject_status: self.reject_status,
            record_payloads: false,
        }
    }
}

impl EngineConfig {
    /// Load from `INTERPOSE_CONFIG`, the working directory and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit file, which must exist when given
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                builder.add_source(File::from(path).required(true))
            }
            None => builder.add_source(File::with_name("interpose").required(false)),
        };

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("INTERPOSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.capture.capacity, "capture.capacity"),
            (self.capture.slot_size, "capture.slot_size"),
            (self.simulation.workers, "simulation.workers"),
            (self.simulation.queue_depth, "simulation.queue_depth"),
        ];

        for (value, field) in checks {
            if value == 0 {
                return Err(EngineError::ConfigError(format!("{} must be > 0", field)));
            }
        }

        Ok(())
    }
}
