//! Implements the background loops reading reports from the HID ports.
//!
//! Every port gets its own OS thread, as the HID read primitive blocks. The
//! thread reads in short slices so that it notices a stop request in time.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, trace, warn};

use crate::{
    frame::{Frame, LONG_REPORT_LENGTH},
    port::{OwnedPort, PortError},
};

/// Spawns a read pump for `port`, handing every parsed frame to `on_frame`.
///
/// The pump stops once `stop` is set, the port is closed or a read fails.
/// In every case it closes the port on its way out.
pub(crate) fn spawn<F>(
    port: Arc<OwnedPort>,
    stop: Arc<AtomicBool>,
    read_slice: Duration,
    mut on_frame: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnMut(Frame) + Send + 'static,
{
    let kind = port.kind();

    thread::Builder::new()
        .name(format!("hidpp-{kind:?}-pump").to_lowercase())
        .spawn(move || {
            let mut buf = [0u8; LONG_REPORT_LENGTH];

            while !stop.load(Ordering::Acquire) {
                let len = match port.read_report(&mut buf, read_slice) {
                    Ok(0) => continue,
                    Ok(len) => len.min(buf.len()),
                    Err(PortError::Closed) => break,
                    Err(err) => {
                        warn!(port = ?kind, %err, "read pump stopped after a read error");
                        break;
                    },
                };

                match Frame::from_bytes(&buf[..len]) {
                    Ok(frame) => {
                        trace!(port = ?kind, ?frame, "received frame");
                        on_frame(frame);
                    },
                    Err(err) => debug!(port = ?kind, %err, "discarded report"),
                }
            }

            if port.close() {
                debug!(port = ?kind, "read pump closed its port");
            }
        })
}
