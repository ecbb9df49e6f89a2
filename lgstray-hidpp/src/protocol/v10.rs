//! Implements functionality specific to HID++1.0, which receivers speak.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::frame::Frame;

/// The index to use when communicating with the receiver itself.
pub const RECEIVER_DEVICE_INDEX: u8 = 0xff;

/// Represents a globally defined sub ID of a HID++1.0 message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum MessageType {
    /// Sets a 3-byte register value.
    SetRegister = 0x80,

    /// Retrieves a 3-byte register value.
    GetRegister = 0x81,

    /// Indicates an error response. The error code can be mapped using
    /// [`ErrorType::try_from`].
    Error = 0x8f,
}

/// Represents the receiver registers this crate accesses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ReceiverRegister {
    /// Reading it yields the amount of paired devices in the second value
    /// byte. Writing `0x02` to it makes the receiver announce every connected
    /// device with an arrival notification.
    Connections = 0x02,
}

/// The value written to [`ReceiverRegister::Connections`] to force device
/// arrival notifications.
pub const FORCE_ANNOUNCE: u8 = 0x02;

/// Builds a request reading a 3-byte receiver register.
pub fn read_register(register: ReceiverRegister) -> Frame {
    Frame::short_v10(RECEIVER_DEVICE_INDEX, MessageType::GetRegister.into(), [
        register.into(),
        0x00,
        0x00,
        0x00,
    ])
}

/// Builds a request writing a 3-byte receiver register.
pub fn write_register(register: ReceiverRegister, value: [u8; 3]) -> Frame {
    Frame::short_v10(RECEIVER_DEVICE_INDEX, MessageType::SetRegister.into(), [
        register.into(),
        value[0],
        value[1],
        value[2],
    ])
}

/// Extracts the error code of a HID++1.0 error echo.
///
/// Returns [`None`] if the frame is no error echo or the code is unknown.
pub fn error_of(frame: &Frame) -> Option<ErrorType> {
    if !frame.is_hidpp10_error() {
        return None;
    }

    ErrorType::try_from(frame.as_bytes()[5]).ok()
}

/// Represents the type of an error a HID++1.0 device returns as part of a
/// message with the [`MessageType::Error`] type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorType {
    Success = 0x00,
    InvalidSubId = 0x01,
    InvalidAddress = 0x02,
    InvalidValue = 0x03,
    ConnectFail = 0x04,
    TooManyDevices = 0x05,
    AlreadyExists = 0x06,
    Busy = 0x07,

    /// No device is paired at the addressed device index.
    UnknownDevice = 0x08,

    /// The addressed device is paired but currently disconnected (usually
    /// asleep). It reconnects once the user interacts with it.
    ResourceError = 0x09,

    RequestUnavailable = 0x0a,
    InvalidParamValue = 0x0b,
    WrongPinCode = 0x0c,
}
