// packages/engine/src/interception/dispatch_table.rs
//! Dispatch table mapping request codes to inspection policies
//!
//! Lookup is two-level: internal device control requests carrying the
//! submit control code are keyed by their transfer function; every other
//! request is keyed by its major function. Anything not in the table is
//! passed through.

use crate::request::codes::{self, IOCTL_INTERNAL_USB_SUBMIT_URB};
use crate::request::{MajorFunction, Parameters};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// What the classifier does with a request before forwarding it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Forward untouched, no inspection
    #[default]
    PassThrough,

    /// Inspect and capture the payload when it qualifies
    InspectCapture,

    /// Inspect (trace) without capturing
    InspectOther,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::PassThrough => "pass_through",
            Policy::InspectCapture => "inspect_capture",
            Policy::InspectOther => "inspect_other",
        }
    }
}

/// Dispatch table
pub struct DispatchTable {
    /// Control code whose requests carry a transfer block
    submit_control_code: u32,

    /// Major function to policy
    majors: RwLock<HashMap<MajorFunction, Policy>>,

    /// Transfer function to policy
    transfer_functions: RwLock<HashMap<u16, Policy>>,
}

impl DispatchTable {
    /// Create an empty table: everything passes through
    pub fn new(submit_control_code: u32) -> Self {
        Self {
            submit_control_code,
            majors: RwLock::new(HashMap::new()),
            transfer_functions: RwLock::new(HashMap::new()),
        }
    }

    /// Table for the illustrated device class: only bulk/interrupt transfers
    /// are inspected for capture, every other known transfer passes through.
    pub fn with_defaults() -> Self {
        Self::with_defaults_for(IOCTL_INTERNAL_USB_SUBMIT_URB)
    }

    /// Default policies keyed under a different submit control code
    pub fn with_defaults_for(submit_control_code: u32) -> Self {
        let table = Self::new(submit_control_code);

        {
            let mut functions = table.transfer_functions.write();
            for &function in codes::TRANSFER_FUNCTION_NAMES.keys() {
                functions.insert(function, Policy::PassThrough);
            }
            functions.insert(
                codes::URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
                Policy::InspectCapture,
            );
        }

        table
    }

    pub fn submit_control_code(&self) -> u32 {
        self.submit_control_code
    }

    /// Set the policy for a major function
    pub fn set_major_policy(&self, major: MajorFunction, policy: Policy) {
        info!("Dispatch policy: {} -> {}", major, policy.as_str());
        self.majors.write().insert(major, policy);
    }

    /// Set the policy for a transfer function
    pub fn set_transfer_policy(&self, function: u16, policy: Policy) {
        info!(
            "Dispatch policy: transfer 0x{:04x} ({}) -> {}",
            function,
            codes::transfer_function_name(function),
            policy.as_str()
        );
        self.transfer_functions.write().insert(function, policy);
    }

    /// Remove a transfer function entry, returning its previous policy
    pub fn remove_transfer_policy(&self, function: u16) -> Option<Policy> {
        self.transfer_functions.write().remove(&function)
    }

    pub fn transfer_policy(&self, function: u16) -> Policy {
        self.transfer_functions
            .read()
            .get(&function)
            .copied()
            .unwrap_or_default()
    }

    pub fn major_policy(&self, major: MajorFunction) -> Policy {
        self.majors.read().get(&major).copied().unwrap_or_default()
    }

    /// Policy for the given request parameters
    pub fn lookup(&self, parameters: &Parameters) -> Policy {
        match parameters {
            Parameters::InternalDeviceControl {
                io_control_code,
                transfer: Some(transfer),
            } if *io_control_code == self.submit_control_code => {
                let policy = self.transfer_policy(transfer.function);
                debug!(
                    "Transfer 0x{:04x} ({}) -> {}",
                    transfer.function,
                    codes::transfer_function_name(transfer.function),
                    policy.as_str()
                );
                policy
            }
            other => self.major_policy(other.major_function()),
        }
    }

    /// Transfer function entries, sorted by code
    pub fn transfer_entries(&self) -> Vec<(u16, Policy)> {
        let mut entries: Vec<_> = self
            .transfer_functions
            .read()
            .iter()
            .map(|(function, policy)| (*function, *policy))
            .collect();
        entries.sort_by_key(|(function, _)| *function);
        entries
    }

    /// Render the non-pass-through entries as text
    pub fn export_config(&self) -> String {
        let mut output = format!(
            "# Dispatch table (submit code 0x{:08x})\n",
            self.submit_control_code
        );

        let mut majors: Vec<_> = self
            .majors
            .read()
            .iter()
            .filter(|(_, policy)| **policy != Policy::PassThrough)
            .map(|(major, policy)| format!("{} -> {}\n", major, policy.as_str()))
            .collect();
        majors.sort();
        output.extend(majors);

        for (function, policy) in self.transfer_entries() {
            if policy != Policy::PassThrough {
                output.push_str(&format!(
                    "transfer 0x{:04x} ({}) -> {}\n",
                    function,
                    codes::transfer_function_name(function),
                    policy.as_str()
                ));
            }
        }

        output
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::codes::{
        URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER, URB_FUNCTION_CONTROL_TRANSFER,
    };
    use crate::request::{Direction, TransferBlock};
    use bytes::Bytes;

    fn transfer_params(function: u16) -> Parameters {
        Parameters::InternalDeviceControl {
            io_control_code: IOCTL_INTERNAL_USB_SUBMIT_URB,
            transfer: Some(TransferBlock::new(function, Direction::In, vec![0u8; 8])),
        }
    }

    #[test]
    fn test_default_table() {
        let table = DispatchTable::with_defaults();

        assert_eq!(
            table.lookup(&transfer_params(URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER)),
            Policy::InspectCapture
        );
        assert_eq!(
            table.lookup(&transfer_params(URB_FUNCTION_CONTROL_TRANSFER)),
            Policy::PassThrough
        );
    }

    #[test]
    fn test_other_majors_pass_through() {
        let table = DispatchTable::with_defaults();

        assert_eq!(table.lookup(&Parameters::Read { length: 8 }), Policy::PassThrough);
        assert_eq!(
            table.lookup(&Parameters::DeviceControl {
                io_control_code: 0x1234,
                input: Bytes::new(),
                output_length: 0,
            }),
            Policy::PassThrough
        );
        assert_eq!(
            table.lookup(&Parameters::Other {
                major: 0x1b,
                data: Bytes::new(),
            }),
            Policy::PassThrough
        );
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        let table = DispatchTable::with_defaults();

        assert_eq!(table.lookup(&transfer_params(0x7fff)), Policy::PassThrough);

        // Bulk transfer under a different control code is not inspected
        let params = Parameters::InternalDeviceControl {
            io_control_code: 0x0022_0013,
            transfer: Some(TransferBlock::new(
                URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER,
                Direction::In,
                vec![0u8; 8],
            )),
        };
        assert_eq!(table.lookup(&params), Policy::PassThrough);

        let no_transfer = Parameters::InternalDeviceControl {
            io_control_code: IOCTL_INTERNAL_USB_SUBMIT_URB,
            transfer: None,
        };
        assert_eq!(table.lookup(&no_transfer), Policy::PassThrough);
    }

    #[test]
    fn test_overrides() {
        let table = DispatchTable::with_defaults();

        table.set_transfer_policy(URB_FUNCTION_CONTROL_TRANSFER, Policy::InspectOther);
        table.set_major_policy(MajorFunction::Write, Policy::InspectOther);

        assert_eq!(
            table.lookup(&transfer_params(URB_FUNCTION_CONTROL_TRANSFER)),
            Policy::InspectOther
        );
        assert_eq!(
            table.lookup(&Parameters::Write { data: Bytes::new() }),
            Policy::InspectOther
        );

        assert_eq!(
            table.remove_transfer_policy(URB_FUNCTION_CONTROL_TRANSFER),
            Some(Policy::InspectOther)
        );
        assert_eq!(
            table.lookup(&transfer_params(URB_FUNCTION_CONTROL_TRANSFER)),
            Policy::PassThrough
        );
    }

    #[test]
    fn test_empty_table() {
        let table = DispatchTable::new(IOCTL_INTERNAL_USB_SUBMIT_URB);
        assert_eq!(
            table.lookup(&transfer_params(URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER)),
            Policy::PassThrough
        );
        assert!(table.transfer_entries().is_empty());
    }

    #[test]
    fn test_export_config() {
        let table = DispatchTable::with_defaults();
        table.set_major_policy(MajorFunction::Read, Policy::InspectOther);

        let config = table.export_config();

        assert!(config.contains("bulk_or_interrupt_transfer -> inspect_capture"));
        assert!(config.contains("read -> inspect_other"));
        assert!(!config.contains("control_transfer"));
    }
}
