//! The error type shared by the correlator, the bus and device sessions.

use thiserror::Error;

use crate::{port::PortError, protocol::v10};

/// Represents an error that occurred while talking HID++ to a receiver or one
/// of its devices.
#[derive(Debug, Error)]
pub enum HidppError {
    /// Indicates that the underlying HID port failed.
    #[error("the HID port returned an error")]
    Port(#[from] PortError),

    /// Indicates that the bus was disposed before or during the operation.
    #[error("the device bus is disposed")]
    Disposed,

    /// Indicates that no matching reply arrived before the deadline.
    ///
    /// HID++ has no negative acknowledgement, so this is also what a request
    /// to a non-existent device or feature results in.
    #[error("no matching reply arrived in time")]
    Timeout,

    /// Indicates that a reply arrived but its content could not be decoded.
    #[error("the reply does not have the expected shape")]
    ProtocolMismatch,

    /// Indicates that the receiver answered a register access with an error.
    #[error("the receiver returned HID++1.0 error {0:?}")]
    Hidpp10(v10::ErrorType),

    /// Indicates that the device does not advertise a feature required for
    /// the operation.
    #[error("the device does not support feature {0:#06x}")]
    MissingFeature(u16),

    /// Indicates that a device session exhausted all initialization attempts.
    #[error("device {device_index} could not be initialized after {attempts} attempts")]
    InitializationFailure { device_index: u8, attempts: u32 },

    /// Indicates that the bus was started outside of a Tokio runtime.
    #[error("the device bus requires a Tokio runtime")]
    NoRuntime,
}
