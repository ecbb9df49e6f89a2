//! Keeps the latest known state of every device reported by the bus.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use lgstray_hidpp::{
    event::{DeviceInitMessage, DeviceMessage, DeviceUpdateMessage},
    feature::{battery::PowerSupplyStatus, device_type_and_name::DeviceType},
};
use serde::Serialize;
use tracing::warn;

/// The state of a single device.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub has_battery: bool,

    /// The values of the latest battery reading, if there was one.
    pub battery_percentage: Option<u8>,
    pub power_status: PowerSupplyStatus,
    pub battery_voltage: Option<f64>,
    pub last_update: Option<DateTime<Local>>,
}

impl DeviceEntry {
    fn from_init(msg: &DeviceInitMessage) -> Self {
        Self {
            device_id: msg.device_id.clone(),
            device_name: msg.device_name.clone(),
            device_type: msg.device_type,
            has_battery: msg.has_battery,
            battery_percentage: None,
            power_status: PowerSupplyStatus::Unknown,
            battery_voltage: None,
            last_update: None,
        }
    }

    fn apply_update(&mut self, msg: &DeviceUpdateMessage) {
        self.device_name.clone_from(&msg.device_name);
        self.device_type = msg.device_type;
        self.battery_percentage = Some(msg.battery_percentage);
        self.power_status = msg.power_status;
        self.battery_voltage = msg.battery_voltage;
        self.last_update = Some(msg.last_update);
    }
}

/// The devices known to the application, keyed by their identifier.
///
/// Devices are only ever added by a [`DeviceInitMessage`]. Updates for
/// devices that were never initialized are dropped.
#[derive(Clone, Debug, Default)]
pub struct DeviceCollection {
    devices: BTreeMap<String, DeviceEntry>,
}

impl DeviceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a message and returns the affected entry, or [`None`] if the
    /// message was dropped.
    pub fn apply(&mut self, message: &DeviceMessage) -> Option<&DeviceEntry> {
        match message {
            DeviceMessage::Init(msg) => {
                let entry = self
                    .devices
                    .entry(msg.device_id.clone())
                    .and_modify(|entry| {
                        entry.device_name.clone_from(&msg.device_name);
                        entry.device_type = msg.device_type;
                        entry.has_battery = msg.has_battery;
                    })
                    .or_insert_with(|| DeviceEntry::from_init(msg));

                Some(&*entry)
            },
            DeviceMessage::Update(msg) => {
                let Some(entry) = self.devices.get_mut(&msg.device_id) else {
                    warn!(device_id = %msg.device_id, "dropped update of unknown device");
                    return None;
                };

                entry.apply_update(msg);
                Some(&*entry)
            },
        }
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceEntry> {
        self.devices.get(device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(id: &str, name: &str) -> DeviceMessage {
        DeviceMessage::Init(DeviceInitMessage {
            device_id: id.into(),
            device_name: name.into(),
            has_battery: true,
            device_type: DeviceType::Mouse,
        })
    }

    fn update(id: &str, percentage: u8) -> DeviceMessage {
        DeviceMessage::Update(DeviceUpdateMessage {
            device_id: id.into(),
            device_name: "G502 LIGHTSPEED".into(),
            device_type: DeviceType::Mouse,
            battery_percentage: percentage,
            power_status: PowerSupplyStatus::Discharging,
            battery_voltage: Some(3.9),
            last_update: Local::now(),
            battery_mileage: 0.0,
        })
    }

    #[test]
    fn updates_of_unknown_devices_are_dropped() {
        let mut collection = DeviceCollection::new();

        assert!(collection.apply(&update("A", 50)).is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn updates_change_known_devices() {
        let mut collection = DeviceCollection::new();
        collection.apply(&init("A", "G502"));

        let entry = collection.apply(&update("A", 42)).unwrap();

        assert_eq!(entry.battery_percentage, Some(42));
        assert_eq!(entry.power_status, PowerSupplyStatus::Discharging);
        assert_eq!(entry.device_name, "G502 LIGHTSPEED");
        assert!(entry.last_update.is_some());
    }

    #[test]
    fn reinitialization_keeps_the_last_reading() {
        let mut collection = DeviceCollection::new();
        collection.apply(&init("A", "G502"));
        collection.apply(&update("A", 42));

        collection.apply(&init("A", "G502 X"));

        let entry = collection.get("A").unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(entry.device_name, "G502 X");
        assert_eq!(entry.battery_percentage, Some(42));
    }

    #[test]
    fn clearing_forgets_everything() {
        let mut collection = DeviceCollection::new();
        collection.apply(&init("A", "G502"));
        collection.apply(&init("B", "MX Keys"));

        collection.clear();

        assert!(collection.is_empty());
        assert!(collection.apply(&update("A", 10)).is_none());
    }
}
