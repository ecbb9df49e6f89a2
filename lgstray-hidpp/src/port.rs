//! Defines the narrow contract this crate needs from a HID transport.
//!
//! The HID communication itself is left to an external library. A receiver
//! exposes HID++ as two separate HID collections (one per report size), each
//! of which is opened as its own [`HidPort`].

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use thiserror::Error;

use crate::frame::ReportKind;

/// Represents one open HID handle carrying HID++ reports of a single size.
///
/// Implementations are shared between the read pump owning the port and the
/// request writer, so both methods take `&self`.
pub trait HidPort: Send + Sync + 'static {
    /// Writes a raw report to the port.
    ///
    /// Writing is fire-and-forget as far as HID++ is concerned; the device
    /// never acknowledges a report on this layer.
    ///
    /// Returns the exact amount of written bytes on success.
    fn write_report(&self, src: &[u8]) -> Result<usize, PortError>;

    /// Reads a raw report, blocking for at most `timeout`.
    ///
    /// Returns `Ok(0)` if no report arrived in time. Any error is treated as
    /// fatal for the port.
    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError>;

    /// Releases the underlying handle. Subsequent reads and writes fail with
    /// [`PortError::Closed`].
    ///
    /// Must be idempotent.
    fn close(&self);
}

/// Wraps a [`HidPort`] and guarantees its handle is released exactly once,
/// no matter how many parties try to close it.
pub(crate) struct OwnedPort {
    kind: ReportKind,
    inner: Box<dyn HidPort>,
    closed: AtomicBool,
}

impl OwnedPort {
    pub(crate) fn new(kind: ReportKind, inner: Box<dyn HidPort>) -> Self {
        Self {
            kind,
            inner,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn kind(&self) -> ReportKind {
        self.kind
    }

    pub(crate) fn write_report(&self, src: &[u8]) -> Result<usize, PortError> {
        if self.is_closed() {
            return Err(PortError::Closed);
        }

        self.inner.write_report(src)
    }

    pub(crate) fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        if self.is_closed() {
            return Err(PortError::Closed);
        }

        self.inner.read_report(buf, timeout)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the port unless it already was. Returns whether this call did.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.inner.close();
        true
    }
}

/// Represents an error returned by a [`HidPort`].
#[derive(Debug, Error)]
pub enum PortError {
    /// Indicates that the port was already closed.
    #[error("the HID port is closed")]
    Closed,

    /// Indicates that hidapi returned an error.
    #[error("hidapi returned an error")]
    HidApi(#[from] hidapi::HidError),

    /// Indicates any other I/O failure of a custom implementation.
    #[error("the HID port failed: {0}")]
    Io(String),
}
