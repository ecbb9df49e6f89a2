//! Implements functionality specific to HID++2.0.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::frame::Frame;

/// The feature index HID++2.0 devices report errors on.
pub const ERROR_FEATURE_INDEX: u8 = 0xff;

/// Checks whether `reply` is a HID++2.0 error report rejecting `request`.
///
/// Error reports move the rejected feature index into byte 3 and the rejected
/// function and software IDs into byte 4, followed by the error code.
pub fn is_error_for(reply: &Frame, request: &Frame) -> bool {
    reply.feature_index() == ERROR_FEATURE_INDEX
        && request.feature_index() != ERROR_FEATURE_INDEX
        && reply.as_bytes()[3] == request.feature_index()
        && reply.param(0) == request.as_bytes()[3]
}

/// Represents an error code of a HID++2.0 error report.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorType {
    NoError = 0x00,
    Unknown = 0x01,
    InvalidArgument = 0x02,
    OutOfRange = 0x03,
    HardwareError = 0x04,
    LogitechInternal = 0x05,
    InvalidFeatureIndex = 0x06,
    InvalidFunctionId = 0x07,
    Busy = 0x08,
    Unsupported = 0x09,
}
