// packages/engine/src/request/codes.rs
//! Request, status and transfer-block codes
//!
//! The transfer-function table is the USB request block set used by the
//! illustrated device class (a USB mouse). Nothing outside the default
//! dispatch table depends on these being USB codes.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Internal device control code that carries a transfer block
pub const IOCTL_INTERNAL_USB_SUBMIT_URB: u32 = 0x0022_0003;

/// Transfer flag bit set when data flows from the device to the caller
pub const USBD_TRANSFER_DIRECTION_IN: u32 = 0x0000_0001;

pub const URB_FUNCTION_SELECT_CONFIGURATION: u16 = 0x0000;
pub const URB_FUNCTION_SELECT_INTERFACE: u16 = 0x0001;
pub const URB_FUNCTION_ABORT_PIPE: u16 = 0x0002;
pub const URB_FUNCTION_TAKE_FRAME_LENGTH_CONTROL: u16 = 0x0003;
pub const URB_FUNCTION_RELEASE_FRAME_LENGTH_CONTROL: u16 = 0x0004;
pub const URB_FUNCTION_GET_FRAME_LENGTH: u16 = 0x0005;
pub const URB_FUNCTION_SET_FRAME_LENGTH: u16 = 0x0006;
pub const URB_FUNCTION_GET_CURRENT_FRAME_NUMBER: u16 = 0x0007;
pub const URB_FUNCTION_CONTROL_TRANSFER: u16 = 0x0008;
pub const URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER: u16 = 0x0009;
pub const URB_FUNCTION_ISOCH_TRANSFER: u16 = 0x000A;
pub const URB_FUNCTION_GET_DESCRIPTOR_FROM_DEVICE: u16 = 0x000B;
pub const URB_FUNCTION_SET_DESCRIPTOR_TO_DEVICE: u16 = 0x000C;
pub const URB_FUNCTION_SET_FEATURE_TO_DEVICE: u16 = 0x000D;
pub const URB_FUNCTION_SET_FEATURE_TO_INTERFACE: u16 = 0x000E;
pub const URB_FUNCTION_SET_FEATURE_TO_ENDPOINT: u16 = 0x000F;
pub const URB_FUNCTION_CLEAR_FEATURE_TO_DEVICE: u16 = 0x0010;
pub const URB_FUNCTION_CLEAR_FEATURE_TO_INTERFACE: u16 = 0x0011;
pub const URB_FUNCTION_CLEAR_FEATURE_TO_ENDPOINT: u16 = 0x0012;
pub const URB_FUNCTION_GET_STATUS_FROM_DEVICE: u16 = 0x0013;
pub const URB_FUNCTION_GET_STATUS_FROM_INTERFACE: u16 = 0x0014;
pub const URB_FUNCTION_GET_STATUS_FROM_ENDPOINT: u16 = 0x0015;
pub const URB_FUNCTION_VENDOR_DEVICE: u16 = 0x0017;
pub const URB_FUNCTION_VENDOR_INTERFACE: u16 = 0x0018;
pub const URB_FUNCTION_VENDOR_ENDPOINT: u16 = 0x0019;
pub const URB_FUNCTION_CLASS_DEVICE: u16 = 0x001A;
pub const URB_FUNCTION_CLASS_INTERFACE: u16 = 0x001B;
pub const URB_FUNCTION_CLASS_ENDPOINT: u16 = 0x001C;
pub const URB_FUNCTION_RESET_PIPE: u16 = 0x001E;
pub const URB_FUNCTION_CLASS_OTHER: u16 = 0x001F;
pub const URB_FUNCTION_VENDOR_OTHER: u16 = 0x0020;
pub const URB_FUNCTION_GET_STATUS_FROM_OTHER: u16 = 0x0021;
pub const URB_FUNCTION_CLEAR_FEATURE_TO_OTHER: u16 = 0x0022;
pub const URB_FUNCTION_SET_FEATURE_TO_OTHER: u16 = 0x0023;
pub const URB_FUNCTION_GET_DESCRIPTOR_FROM_ENDPOINT: u16 = 0x0024;
pub const URB_FUNCTION_SET_DESCRIPTOR_TO_ENDPOINT: u16 = 0x0025;
pub const URB_FUNCTION_GET_CONFIGURATION: u16 = 0x0026;
pub const URB_FUNCTION_GET_INTERFACE: u16 = 0x0027;
pub const URB_FUNCTION_GET_DESCRIPTOR_FROM_INTERFACE: u16 = 0x0028;
pub const URB_FUNCTION_SET_DESCRIPTOR_TO_INTERFACE: u16 = 0x0029;
pub const URB_FUNCTION_GET_MS_FEATURE_DESCRIPTOR: u16 = 0x002A;
pub const URB_FUNCTION_SYNC_RESET_PIPE: u16 = 0x0030;
pub const URB_FUNCTION_SYNC_CLEAR_STALL: u16 = 0x0031;
pub const URB_FUNCTION_CONTROL_TRANSFER_EX: u16 = 0x0032;
pub const URB_FUNCTION_OPEN_STATIC_STREAMS: u16 = 0x0035;
pub const URB_FUNCTION_CLOSE_STATIC_STREAMS: u16 = 0x0036;
pub const URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER_USING_CHAINED_MDL: u16 = 0x0037;
pub const URB_FUNCTION_ISOCH_TRANSFER_USING_CHAINED_MDL: u16 = 0x0038;

/// Human-readable names for the known transfer functions
pub static TRANSFER_FUNCTION_NAMES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (URB_FUNCTION_SELECT_CONFIGURATION, "select_configuration"),
        (URB_FUNCTION_SELECT_INTERFACE, "select_interface"),
        (URB_FUNCTION_ABORT_PIPE, "abort_pipe"),
        (URB_FUNCTION_TAKE_FRAME_LENGTH_CONTROL, "take_frame_length_control"),
        (URB_FUNCTION_RELEASE_FRAME_LENGTH_CONTROL, "release_frame_length_control"),
        (URB_FUNCTION_GET_FRAME_LENGTH, "get_frame_length"),
        (URB_FUNCTION_SET_FRAME_LENGTH, "set_frame_length"),
        (URB_FUNCTION_GET_CURRENT_FRAME_NUMBER, "get_current_frame_number"),
        (URB_FUNCTION_CONTROL_TRANSFER, "control_transfer"),
        (URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER, "bulk_or_interrupt_transfer"),
        (URB_FUNCTION_ISOCH_TRANSFER, "isoch_transfer"),
        (URB_FUNCTION_GET_DESCRIPTOR_FROM_DEVICE, "get_descriptor_from_device"),
        (URB_FUNCTION_SET_DESCRIPTOR_TO_DEVICE, "set_descriptor_to_device"),
        (URB_FUNCTION_SET_FEATURE_TO_DEVICE, "set_feature_to_device"),
        (URB_FUNCTION_SET_FEATURE_TO_INTERFACE, "set_feature_to_interface"),
        (URB_FUNCTION_SET_FEATURE_TO_ENDPOINT, "set_feature_to_endpoint"),
        (URB_FUNCTION_CLEAR_FEATURE_TO_DEVICE, "clear_feature_to_device"),
        (URB_FUNCTION_CLEAR_FEATURE_TO_INTERFACE, "clear_feature_to_interface"),
        (URB_FUNCTION_CLEAR_FEATURE_TO_ENDPOINT, "clear_feature_to_endpoint"),
        (URB_FUNCTION_GET_STATUS_FROM_DEVICE, "get_status_from_device"),
        (URB_FUNCTION_GET_STATUS_FROM_INTERFACE, "get_status_from_interface"),
        (URB_FUNCTION_GET_STATUS_FROM_ENDPOINT, "get_status_from_endpoint"),
        (URB_FUNCTION_VENDOR_DEVICE, "vendor_device"),
        (URB_FUNCTION_VENDOR_INTERFACE, "vendor_interface"),
        (URB_FUNCTION_VENDOR_ENDPOINT, "vendor_endpoint"),
        (URB_FUNCTION_CLASS_DEVICE, "class_device"),
        (URB_FUNCTION_CLASS_INTERFACE, "class_interface"),
        (URB_FUNCTION_CLASS_ENDPOINT, "class_endpoint"),
        (URB_FUNCTION_RESET_PIPE, "reset_pipe"),
        (URB_FUNCTION_CLASS_OTHER, "class_other"),
        (URB_FUNCTION_VENDOR_OTHER, "vendor_other"),
        (URB_FUNCTION_GET_STATUS_FROM_OTHER, "get_status_from_other"),
        (URB_FUNCTION_CLEAR_FEATURE_TO_OTHER, "clear_feature_to_other"),
        (URB_FUNCTION_SET_FEATURE_TO_OTHER, "set_feature_to_other"),
        (URB_FUNCTION_GET_DESCRIPTOR_FROM_ENDPOINT, "get_descriptor_from_endpoint"),
        (URB_FUNCTION_SET_DESCRIPTOR_TO_ENDPOINT, "set_descriptor_to_endpoint"),
        (URB_FUNCTION_GET_CONFIGURATION, "get_configuration"),
        (URB_FUNCTION_GET_INTERFACE, "get_interface"),
        (URB_FUNCTION_GET_DESCRIPTOR_FROM_INTERFACE, "get_descriptor_from_interface"),
        (URB_FUNCTION_SET_DESCRIPTOR_TO_INTERFACE, "set_descriptor_to_interface"),
        (URB_FUNCTION_GET_MS_FEATURE_DESCRIPTOR, "get_ms_feature_descriptor"),
        (URB_FUNCTION_SYNC_RESET_PIPE, "sync_reset_pipe"),
        (URB_FUNCTION_SYNC_CLEAR_STALL, "sync_clear_stall"),
        (URB_FUNCTION_CONTROL_TRANSFER_EX, "control_transfer_ex"),
        (URB_FUNCTION_OPEN_STATIC_STREAMS, "open_static_streams"),
        (URB_FUNCTION_CLOSE_STATIC_STREAMS, "close_static_streams"),
        (
            URB_FUNCTION_BULK_OR_INTERRUPT_TRANSFER_USING_CHAINED_MDL,
            "bulk_or_interrupt_transfer_using_chained_mdl",
        ),
        (
            URB_FUNCTION_ISOCH_TRANSFER_USING_CHAINED_MDL,
            "isoch_transfer_using_chained_mdl",
        ),
    ])
});

/// Name of a transfer function, or `"unknown"`
pub fn transfer_function_name(function: u16) -> &'static str {
    TRANSFER_FUNCTION_NAMES
        .get(&function)
        .copied()
        .unwrap_or("unknown")
}

/// Major function (request type code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MajorFunction {
    Create,
    Close,
    Read,
    Write,
    DeviceControl,
    InternalDeviceControl,
    /// Any other type code, delivered to the default handler
    Other(u8),
}

impl MajorFunction {
    pub fn code(&self) -> u8 {
        match self {
            MajorFunction::Create => 0x00,
            MajorFunction::Close => 0x02,
            MajorFunction::Read => 0x03,
            MajorFunction::Write => 0x04,
            MajorFunction::DeviceControl => 0x0e,
            MajorFunction::InternalDeviceControl => 0x0f,
            MajorFunction::Other(code) => *code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => MajorFunction::Create,
            0x02 => MajorFunction::Close,
            0x03 => MajorFunction::Read,
            0x04 => MajorFunction::Write,
            0x0e => MajorFunction::DeviceControl,
            0x0f => MajorFunction::InternalDeviceControl,
            other => MajorFunction::Other(other),
        }
    }
}

impl fmt::Display for MajorFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MajorFunction::Create => write!(f, "create"),
            MajorFunction::Close => write!(f, "close"),
            MajorFunction::Read => write!(f, "read"),
            MajorFunction::Write => write!(f, "write"),
            MajorFunction::DeviceControl => write!(f, "device_control"),
            MajorFunction::InternalDeviceControl => write!(f, "internal_device_control"),
            MajorFunction::Other(code) => write!(f, "other(0x{:02x})", code),
        }
    }
}

/// Data direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the device into the caller's buffer
    In,

    /// From the caller to the device
    Out,
}

impl Direction {
    pub fn from_transfer_flags(flags: u32) -> Self {
        if flags & USBD_TRANSFER_DIRECTION_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn transfer_flags(&self) -> u32 {
        match self {
            Direction::In => USBD_TRANSFER_DIRECTION_IN,
            Direction::Out => 0,
        }
    }
}

/// Terminal status of a request (NT status encoding, negative = failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "i64")]
pub struct Status(i32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const UNSUCCESSFUL: Status = Status(0xC000_0001_u32 as i32);
    pub const NO_SUCH_DEVICE: Status = Status(0xC000_000E_u32 as i32);
    pub const INSUFFICIENT_RESOURCES: Status = Status(0xC000_009A_u32 as i32);
    pub const DEVICE_NOT_CONNECTED: Status = Status(0xC000_009D_u32 as i32);
    pub const CANCELLED: Status = Status(0xC000_0120_u32 as i32);
    pub const INVALID_DEVICE_STATE: Status = Status(0xC000_0184_u32 as i32);

    pub const fn from_raw(raw: u32) -> Self {
        Status(raw as i32)
    }

    pub const fn raw(&self) -> u32 {
        self.0 as u32
    }

    pub const fn is_success(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.raw())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Status::from_raw)
                .map_err(|e| format!("invalid status '{}': {}", s, e));
        }
        s.parse::<i64>()
            .map_err(|e| format!("invalid status '{}': {}", s, e))
            .and_then(|code| Status::try_from(StatusRepr::Code(code)))
    }
}

impl From<Status> for i64 {
    fn from(status: Status) -> Self {
        status.0 as i64
    }
}

/// Accepted serialized forms: a signed or unsigned 32-bit integer, or a
/// hex/decimal string such as `"0xC0000001"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Code(i64),
    Text(String),
}

impl TryFrom<StatusRepr> for Status {
    type Error = String;

    fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
        match repr {
            StatusRepr::Code(code) if (i32::MIN as i64..=i32::MAX as i64).contains(&code) => {
                Ok(Status(code as i32))
            }
            StatusRepr::Code(code) if (0..=u32::MAX as i64).contains(&code) => {
                Ok(Status::from_raw(code as u32))
            }
            StatusRepr::Code(code) => Err(format!("status {} out of range", code)),
            StatusRepr::Text(text) => text.parse(),
        }
    }
}
