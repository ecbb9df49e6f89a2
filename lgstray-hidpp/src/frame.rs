//! Implements the byte-level framing of HID++ reports.
//!
//! Both protocol versions share the same two report layouts:
//!
//! | Offset | Short (7 bytes)              | Long (20 bytes)              |
//! |--------|------------------------------|------------------------------|
//! | 0      | `0x10`                       | `0x11`                       |
//! | 1      | device index                 | device index                 |
//! | 2      | feature index / sub ID       | feature index / sub ID       |
//! | 3      | function << 4 \| software ID | function << 4 \| software ID |
//! | 4..    | 3 parameter bytes            | 16 parameter bytes           |
//!
//! HID++1.0 reads byte 3 as the first parameter (usually a register address),
//! which is why [`Frame`] exposes both interpretations instead of splitting
//! the protocol versions into separate types.

use thiserror::Error;

pub const SHORT_REPORT_ID: u8 = 0x10;
pub const SHORT_REPORT_LENGTH: usize = 7;

pub const LONG_REPORT_ID: u8 = 0x11;
pub const LONG_REPORT_LENGTH: usize = 20;

/// The amount of parameter bytes in a long report, which is the most any
/// frame can carry.
pub const MAX_PARAMS_LENGTH: usize = LONG_REPORT_LENGTH - 4;

/// The software ID this client tags all of its HID++2.0 requests with.
///
/// Devices echo it in their responses, while notifications they send on their
/// own always carry a software ID of zero.
pub const SW_ID: u8 = 0x0a;

/// The sub ID of the notification a receiver sends whenever a paired device
/// connects or is announced.
pub const DEVICE_ARRIVAL_SUB_ID: u8 = 0x41;

/// The sub ID of a HID++1.0 error response. Replies carrying it in place of a
/// feature index are never real HID++2.0 responses.
pub const HIDPP10_ERROR_SUB_ID: u8 = 0x8f;

/// Represents the two report sizes HID++ communicates with.
///
/// Receivers expose them as two distinct HID collections, so the kind also
/// identifies the port a frame travels on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ReportKind {
    Short,
    Long,
}

impl ReportKind {
    /// The full length of a report of this kind, including the report ID.
    pub fn report_len(self) -> usize {
        match self {
            Self::Short => SHORT_REPORT_LENGTH,
            Self::Long => LONG_REPORT_LENGTH,
        }
    }

    /// The report ID reports of this kind start with.
    pub fn report_id(self) -> u8 {
        match self {
            Self::Short => SHORT_REPORT_ID,
            Self::Long => LONG_REPORT_ID,
        }
    }
}

/// Represents a single, fixed-size HID++ report.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    Short([u8; SHORT_REPORT_LENGTH]),
    Long([u8; LONG_REPORT_LENGTH]),
}

impl Frame {
    /// Builds a short HID++2.0 request.
    ///
    /// Only the 4 low bits of `function_id` and `software_id` are used.
    pub fn short(
        device_index: u8,
        feature_index: u8,
        function_id: u8,
        software_id: u8,
        params: [u8; 3],
    ) -> Self {
        let mut data = [0u8; SHORT_REPORT_LENGTH];
        data[0] = SHORT_REPORT_ID;
        data[1] = device_index;
        data[2] = feature_index;
        data[3] = pack_function(function_id, software_id);
        data[4..].copy_from_slice(&params);

        Self::Short(data)
    }

    /// Builds a long HID++2.0 request. Parameters beyond 16 bytes are
    /// discarded, missing ones are zero.
    pub fn long(
        device_index: u8,
        feature_index: u8,
        function_id: u8,
        software_id: u8,
        params: &[u8],
    ) -> Self {
        let mut data = [0u8; LONG_REPORT_LENGTH];
        data[0] = LONG_REPORT_ID;
        data[1] = device_index;
        data[2] = feature_index;
        data[3] = pack_function(function_id, software_id);

        let len = params.len().min(MAX_PARAMS_LENGTH);
        data[4..4 + len].copy_from_slice(&params[..len]);

        Self::Long(data)
    }

    /// Builds a short HID++1.0 message. The first payload byte takes the
    /// place of the function and software IDs.
    pub fn short_v10(device_index: u8, sub_id: u8, payload: [u8; 4]) -> Self {
        let mut data = [0u8; SHORT_REPORT_LENGTH];
        data[0] = SHORT_REPORT_ID;
        data[1] = device_index;
        data[2] = sub_id;
        data[3..].copy_from_slice(&payload);

        Self::Short(data)
    }

    /// Parses a raw report as read from a HID port.
    ///
    /// The length has to match the report ID exactly.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let Some(&report_id) = data.first() else {
            return Err(FrameError::InvalidLength(0));
        };

        match report_id {
            SHORT_REPORT_ID => data
                .try_into()
                .map(Self::Short)
                .map_err(|_| FrameError::InvalidLength(data.len())),
            LONG_REPORT_ID => data
                .try_into()
                .map(Self::Long)
                .map_err(|_| FrameError::InvalidLength(data.len())),
            other => Err(FrameError::UnknownReportId(other)),
        }
    }

    /// The raw bytes of the report, including the report ID.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Short(data) => data,
            Self::Long(data) => data,
        }
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Short(_) => ReportKind::Short,
            Self::Long(_) => ReportKind::Long,
        }
    }

    pub fn device_index(&self) -> u8 {
        self.as_bytes()[1]
    }

    /// The feature index of a HID++2.0 message.
    pub fn feature_index(&self) -> u8 {
        self.as_bytes()[2]
    }

    /// The sub ID of a HID++1.0 message. This is the same byte as
    /// [`Self::feature_index`].
    pub fn sub_id(&self) -> u8 {
        self.as_bytes()[2]
    }

    /// The function ID of a HID++2.0 message (high nibble of byte 3).
    pub fn function_id(&self) -> u8 {
        self.as_bytes()[3] >> 4
    }

    /// The software ID of a HID++2.0 message (low nibble of byte 3).
    pub fn software_id(&self) -> u8 {
        self.as_bytes()[3] & 0x0f
    }

    /// The HID++2.0 parameter bytes, starting at offset 4.
    pub fn params(&self) -> &[u8] {
        &self.as_bytes()[4..]
    }

    /// Reads a single HID++2.0 parameter byte.
    ///
    /// Short reports only carry 3 parameters; reading past them yields zero,
    /// matching how devices pad replies that do not need the long layout.
    pub fn param(&self, index: usize) -> u8 {
        self.params().get(index).copied().unwrap_or(0)
    }

    /// Reads a parameter of a reply that packs its values in groups of three
    /// bytes, i.e. the byte at `group * 3 + offset`.
    pub fn param_group(&self, group: usize, offset: usize) -> u8 {
        self.param(group * 3 + offset)
    }

    /// Extracts the parameters into an array fitting the longest possible
    /// payload, filling the rest up with zeroes.
    pub fn extend_params(&self) -> [u8; MAX_PARAMS_LENGTH] {
        let mut data = [0u8; MAX_PARAMS_LENGTH];
        let params = self.params();
        data[..params.len()].copy_from_slice(params);
        data
    }

    /// Whether this is a HID++1.0 error (or timeout) echo.
    pub fn is_hidpp10_error(&self) -> bool {
        self.sub_id() == HIDPP10_ERROR_SUB_ID
    }

    /// Whether this is a device arrival notification of a device whose link
    /// is established.
    ///
    /// Bit 6 of the first parameter byte is set while the receiver has lost
    /// the link to the device, in which case it cannot be talked to yet.
    pub fn is_arrival(&self) -> bool {
        self.sub_id() == DEVICE_ARRIVAL_SUB_ID && self.param(0) & 0x40 == 0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame[")?;
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        write!(f, "]")
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = FrameError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value)
    }
}

/// Combines a function ID (high nibble) and a software ID (low nibble).
fn pack_function(function_id: u8, software_id: u8) -> u8 {
    (function_id & 0x0f) << 4 | (software_id & 0x0f)
}

/// Represents an error that occurred while parsing a raw report.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum FrameError {
    /// Indicates that the length does not match the one implied by the report
    /// ID.
    #[error("invalid HID++ report length {0}")]
    InvalidLength(usize),

    /// Indicates that the report is no HID++ report.
    #[error("unknown report ID {0:#04x}")]
    UnknownReportId(u8),
}
