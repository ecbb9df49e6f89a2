//! Implements the protocol-specific parts of HID++.
//!
//! The wire format is shared by both protocol versions (see
//! [`crate::frame`]); what differs is how a reply is recognized as the answer
//! to a request. [`MatchMode`] captures these rules.

use tracing::debug;

use crate::frame::{Frame, SW_ID};

pub mod v10;
pub mod v20;

/// Decides which incoming frames answer a request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MatchMode {
    /// A HID++2.0 reply echoes the device index and feature index of the
    /// request and carries our [`SW_ID`]. HID++1.0 error echoes are ignored.
    Hidpp20,

    /// Like [`Self::Hidpp20`], but a HID++1.0 error echo for the addressed
    /// device ends the wait early. Used when probing devices that may only
    /// speak HID++1.0 or may not exist at all.
    Hidpp20Strict,

    /// A HID++1.0 register reply echoes the device index and sub ID of the
    /// request. An error echo for the same sub ID is a reply as well.
    Hidpp10,
}

/// The outcome of testing a single incoming frame against a request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Verdict {
    /// The frame answers the request.
    Accept,

    /// The frame proves that no answer will come.
    Abort,

    /// The frame is unrelated and has to be discarded.
    Skip,
}

impl MatchMode {
    pub(crate) fn evaluate(self, request: &Frame, reply: &Frame) -> Verdict {
        if reply.device_index() != request.device_index() {
            return Verdict::Skip;
        }

        match self {
            Self::Hidpp20 | Self::Hidpp20Strict => {
                if reply.is_hidpp10_error() && request.feature_index() != reply.feature_index() {
                    return if self == Self::Hidpp20Strict {
                        Verdict::Abort
                    } else {
                        Verdict::Skip
                    };
                }

                if v20::is_error_for(reply, request) {
                    debug!(
                        device_index = request.device_index(),
                        feature_index = request.feature_index(),
                        error = ?v20::ErrorType::try_from(reply.param(1)),
                        "device rejected request"
                    );
                    return Verdict::Abort;
                }

                if reply.feature_index() == request.feature_index() && reply.software_id() == SW_ID
                {
                    Verdict::Accept
                } else {
                    Verdict::Skip
                }
            },
            Self::Hidpp10 => {
                let register = request.as_bytes()[3];
                if reply.sub_id() == request.sub_id() && reply.as_bytes()[3] == register {
                    return Verdict::Accept;
                }

                // Error echoes carry the sub ID and register of the failed request in the
                // bytes following their own sub ID.
                if reply.is_hidpp10_error()
                    && reply.as_bytes()[3] == request.sub_id()
                    && reply.as_bytes()[4] == register
                {
                    return Verdict::Accept;
                }

                Verdict::Skip
            },
        }
    }
}
