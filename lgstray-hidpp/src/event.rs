//! Messages describing devices and their battery state, and the emitter
//! broadcasting them.

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::feature::{
    battery::{BatteryStatus, PowerSupplyStatus},
    device_type_and_name::DeviceType,
};

/// Sent whenever a device session finished its initialization.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInitMessage {
    /// The stable identifier of the device.
    pub device_id: String,

    /// The marketing name of the device.
    pub device_name: String,

    /// Whether the device supports one of the battery features.
    pub has_battery: bool,

    pub device_type: DeviceType,
}

/// Sent for every successful battery poll of a device.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceUpdateMessage {
    /// The stable identifier of the device.
    pub device_id: String,

    /// The marketing name of the device.
    pub device_name: String,

    pub device_type: DeviceType,

    /// The charge of the battery in percent.
    pub battery_percentage: u8,

    pub power_status: PowerSupplyStatus,

    /// The battery voltage in volts, if the device reports it.
    pub battery_voltage: Option<f64>,

    /// When the reading was taken.
    pub last_update: DateTime<Local>,

    /// Remaining runtime estimate. No supported feature reports it, so it is
    /// always zero.
    pub battery_mileage: f64,
}

impl DeviceUpdateMessage {
    /// Builds an update from a fresh battery reading.
    pub fn new(
        device_id: String,
        device_name: String,
        device_type: DeviceType,
        status: BatteryStatus,
        last_update: DateTime<Local>,
    ) -> Self {
        Self {
            device_id,
            device_name,
            device_type,
            battery_percentage: status.percentage,
            power_status: status.status,
            battery_voltage: status.millivolts.map(|mv| mv as f64 / 1000.0),
            last_update,
            battery_mileage: 0.0,
        }
    }
}

/// Represents any message about a device.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum DeviceMessage {
    Init(DeviceInitMessage),
    Update(DeviceUpdateMessage),
}

impl DeviceMessage {
    /// The identifier of the device the message is about.
    pub fn device_id(&self) -> &str {
        match self {
            Self::Init(msg) => &msg.device_id,
            Self::Update(msg) => &msg.device_id,
        }
    }
}

/// A simple event emitter sending a single event to multiple MPSC channels.
#[derive(Debug)]
pub struct EventEmitter<T: Clone> {
    senders: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new receiver and adds the corresponding sender to the sender
    /// list.
    pub fn create_receiver(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Emits an event to all senders. Senders whose receivers were dropped are
    /// removed from the list.
    pub fn emit(&self, event: T) {
        self.senders
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}
