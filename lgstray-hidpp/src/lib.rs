//! A client for the HID++ protocol spoken by Logitech's wireless receivers,
//! focused on the battery and identity telemetry of the paired devices.
//!
//! Receivers expose two HID collections, one for short (7 byte) and one for
//! long (20 byte) reports. Both are read by a background pump each, while
//! requests go through a single [`channel::HidppChannel`] that allows one
//! request in flight at a time. HID++ has no negative acknowledgement, so
//! every wait is bounded by one of the deadlines in [`config::BusConfig`].
//!
//! The work done by the Solaar team on
//! [their Logitech device manager](https://github.com/pwr-Solaar/Solaar) was
//! a great help in understanding the battery features.
//!
//! # Quickstart
//!
//! ```ignore
//! use std::{sync::Arc, time::Duration};
//!
//! use lgstray_hidpp::{
//!     bus::DeviceBus,
//!     config::BusConfig,
//!     event::DeviceMessage,
//!     interface::{self, DEFAULT_PRODUCT_IDS, DEFAULT_VENDOR_ID},
//!     poller::BatteryPoller,
//! };
//!
//! // Find the receiver and open its short and long collections.
//! let (short, long) = interface::open_receiver(DEFAULT_VENDOR_ID, &DEFAULT_PRODUCT_IDS)?;
//!
//! // Start reading from both collections and discover the paired devices.
//! // Devices announcing themselves later are picked up automatically.
//! let bus = Arc::new(DeviceBus::start(Box::new(short), Box::new(long), BusConfig::default()).await?);
//! let messages = bus.subscribe();
//!
//! // Poll the battery of every initialized device once a minute.
//! let poller = BatteryPoller::spawn(Arc::clone(&bus), Duration::from_secs(60))?;
//!
//! while let Ok(message) = messages.recv_async().await {
//!     match message {
//!         DeviceMessage::Init(init) => println!("{} connected", init.device_name),
//!         DeviceMessage::Update(update) => {
//!             println!("{}: {}%", update.device_name, update.battery_percentage)
//!         },
//!     }
//! }
//! ```

pub use async_trait::async_trait;

pub mod bus;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod feature;
pub mod frame;
pub mod interface;
pub mod poller;
pub mod port;
pub mod protocol;
pub(crate) mod pump;
pub mod queue;

#[cfg(test)]
mod testing;
