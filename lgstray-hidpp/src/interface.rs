//! Provides the [`HidPort`] implementation for receivers connected to the
//! local machine.
//!
//! This module makes heavy use of [`hidapi`](https://docs.rs/hidapi), an
//! abstraction over the [libusb/hidapi](https://github.com/libusb/hidapi) C
//! library providing cross-platform support for interacting with HID devices.

use std::{collections::BTreeSet, ffi::CStr, time::Duration};

use hidapi::{DeviceInfo, HidApi, HidDevice, MAX_REPORT_DESCRIPTOR_SIZE};
use hidreport::{Field, Report, ReportDescriptor, Usage, UsageId, UsagePage};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    frame::ReportKind,
    port::{HidPort, PortError},
};

/// The vendor ID of Logitech.
pub const DEFAULT_VENDOR_ID: u16 = 0x046d;

/// The product IDs of the receivers looked for by default: LIGHTSPEED
/// (`0xc539`, `0xc53f`, `0xc547`), Unifying (`0xc52b`) and Bolt (`0xc548`).
pub const DEFAULT_PRODUCT_IDS: [u16; 5] = [0xc539, 0xc52b, 0xc53f, 0xc547, 0xc548];

const HIDPP_USAGE_PAGE: u16 = 0xff00;
const SHORT_REPORT_USAGE: u16 = 0x0001;
const LONG_REPORT_USAGE: u16 = 0x0002;

/// A HID++ port backed by hidapi.
///
/// Reading and writing use separate handles to the same collection, so a
/// write never waits for a read blocking in the pump.
pub struct HidapiPort {
    kind: ReportKind,
    reader: Mutex<Option<HidDevice>>,
    writer: Mutex<Option<HidDevice>>,
}

impl HidapiPort {
    /// Opens the collection at `path` for reports of the given kind.
    pub fn open(api: &HidApi, kind: ReportKind, path: &CStr) -> Result<Self, InterfaceError> {
        let reader = api.open_path(path)?;
        let writer = api.open_path(path)?;

        Ok(Self {
            kind,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        })
    }
}

impl HidPort for HidapiPort {
    fn write_report(&self, src: &[u8]) -> Result<usize, PortError> {
        let writer = self.writer.lock();
        let device = writer.as_ref().ok_or(PortError::Closed)?;

        Ok(device.write(src)?)
    }

    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let reader = self.reader.lock();
        let device = reader.as_ref().ok_or(PortError::Closed)?;

        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let len = device.read_timeout(buf, millis)?;

        // Platforms exposing a single node for both collections hand every
        // report to every handle.
        if len > 0 && buf[0] != self.kind.report_id() {
            trace!(port = ?self.kind, report_id = buf[0], "ignored report of the other port");
            return Ok(0);
        }

        Ok(len)
    }

    fn close(&self) {
        self.writer.lock().take();
        self.reader.lock().take();
    }
}

/// Searches the first receiver matching `vendor_id` and one of `product_ids`
/// and opens its short and long HID++ collections.
///
/// Collections are recognized by their usage. If the platform does not
/// report usages, the report descriptors of all matching devices are
/// inspected instead.
pub fn open_receiver(
    vendor_id: u16,
    product_ids: &[u16],
) -> Result<(HidapiPort, HidapiPort), InterfaceError> {
    let api = HidApi::new()?;

    let candidates: Vec<&DeviceInfo> = api
        .device_list()
        .filter(|info| info.vendor_id() == vendor_id && product_ids.contains(&info.product_id()))
        .collect();

    let (mut short, mut long) = pick_collections(
        candidates
            .iter()
            .map(|info| (info.usage_page(), info.usage(), info.path())),
    );

    if short.is_none() || long.is_none() {
        debug!("collections lack usages, inspecting report descriptors");

        // hidapi returns an entry per usage, so the same path may show up
        // more than once.
        let paths: BTreeSet<&CStr> = candidates.iter().map(|info| info.path()).collect();
        for path in paths {
            let device = match api.open_path(path) {
                Ok(device) => device,
                Err(err) => {
                    debug!(?path, %err, "could not open HID device");
                    continue;
                },
            };

            match device.hidpp_reports() {
                Ok((has_short, has_long)) => {
                    if has_short {
                        short.get_or_insert(path);
                    }
                    if has_long {
                        long.get_or_insert(path);
                    }
                },
                Err(err) => debug!(?path, %err, "could not inspect report descriptor"),
            }
        }
    }

    let (Some(short), Some(long)) = (short, long) else {
        return Err(InterfaceError::NoReceiver { vendor_id });
    };

    info!(?short, ?long, "found receiver");
    Ok((
        HidapiPort::open(&api, ReportKind::Short, short)?,
        HidapiPort::open(&api, ReportKind::Long, long)?,
    ))
}

/// Picks the first short and long HID++ collection out of
/// `(usage page, usage, path)` entries.
fn pick_collections<'a>(
    entries: impl Iterator<Item = (u16, u16, &'a CStr)>,
) -> (Option<&'a CStr>, Option<&'a CStr>) {
    let mut short = None;
    let mut long = None;

    for (usage_page, usage, path) in entries {
        if usage_page != HIDPP_USAGE_PAGE {
            continue;
        }

        match usage {
            SHORT_REPORT_USAGE => {
                short.get_or_insert(path);
            },
            LONG_REPORT_USAGE => {
                long.get_or_insert(path);
            },
            _ => {},
        }
    }

    (short, long)
}

trait HidDeviceExt {
    /// Checks which of the HID++ reports the device declares.
    fn hidpp_reports(&self) -> Result<(bool, bool), InterfaceError>;
}

impl HidDeviceExt for HidDevice {
    fn hidpp_reports(&self) -> Result<(bool, bool), InterfaceError> {
        let mut raw_descriptor = vec![0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let descriptor_size = self.get_report_descriptor(&mut raw_descriptor)?;
        let descriptor = ReportDescriptor::try_from(&raw_descriptor[..descriptor_size])?;

        Ok((
            declares_report(&descriptor, ReportKind::Short, SHORT_REPORT_USAGE),
            declares_report(&descriptor, ReportKind::Long, LONG_REPORT_USAGE),
        ))
    }
}

fn declares_report(descriptor: &ReportDescriptor, kind: ReportKind, usage: u16) -> bool {
    descriptor
        .find_input_report(&[kind.report_id()])
        .and_then(|report| report.fields().first())
        .and_then(|field| match field {
            Field::Array(arr) => Some(arr.usage_range()),
            _ => None,
        })
        .is_some_and(|range| {
            range
                .lookup_usage(&Usage::from_page_and_id(
                    UsagePage::from(HIDPP_USAGE_PAGE),
                    UsageId::from(usage),
                ))
                .is_some()
        })
}

/// Represents an error that occurred while looking for or opening a receiver.
#[derive(Debug, Error)]
pub enum InterfaceError {
    /// Indicates that hidapi returned an error.
    #[error("hidapi returned an error")]
    HidApi(#[from] hidapi::HidError),

    /// Indicates that the HID report descriptor could not be parsed.
    #[error("the report descriptor could not be parsed")]
    ReportDescriptor(#[from] hidreport::ParserError),

    /// Indicates that no connected device exposes both HID++ collections.
    #[error("no receiver with vendor ID {vendor_id:#06x} exposing HID++ was found")]
    NoReceiver { vendor_id: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_collections_by_usage() {
        let entries = [
            (0x0001, 0x0002, c"/dev/hidraw0"),
            (0xff00, 0x0002, c"/dev/hidraw2"),
            (0xff00, 0x0001, c"/dev/hidraw1"),
            (0xff00, 0x0001, c"/dev/hidraw3"),
        ];

        let (short, long) = pick_collections(entries.into_iter());

        assert_eq!(short, Some(c"/dev/hidraw1"));
        assert_eq!(long, Some(c"/dev/hidraw2"));
    }

    #[test]
    fn ignores_other_usage_pages() {
        let entries = [(0x000c, 0x0001, c"/dev/hidraw0")];

        assert_eq!(pick_collections(entries.into_iter()), (None, None));
    }
}
