//! Maintains a registry of well-known HID++2.0 features and the battery
//! feature implementations.

use std::{collections::HashMap, sync::Arc};

use lazy_static::lazy_static;

use super::{
    CreatableFeature,
    battery::{BatteryFeature, BatteryStatusFeature, BatteryVoltageFeature, UnifiedBatteryFeature},
    table::FeatureTable,
};
use crate::channel::HidppChannel;

/// Represents a function that creates a battery feature implementation.
pub type BatteryProducer =
    fn(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Arc<dyn BatteryFeature>;

/// The battery features in the order they are preferred in when a device
/// advertises more than one.
pub const BATTERY_PRECEDENCE: [u16; 3] = [
    BatteryStatusFeature::ID,
    BatteryVoltageFeature::ID,
    UnifiedBatteryFeature::ID,
];

/// Represents a known HID++2.0 device feature.
#[derive(Clone, Copy, Debug)]
pub struct KnownFeature {
    /// The name of the feature.
    /// This is usually a slightly modified version of the name found in
    /// Logitech's documentation.
    pub name: &'static str,

    /// Creates the implementation of a battery feature.
    pub battery: Option<BatteryProducer>,
}

/// Looks up a feature by its ID.
pub fn lookup(feature_id: u16) -> Option<KnownFeature> {
    KNOWN_FEATURES.get(&feature_id).copied()
}

/// Returns the name of a feature, or `"Unknown"`.
pub fn name(feature_id: u16) -> &'static str {
    lookup(feature_id).map_or("Unknown", |feat| feat.name)
}

/// Creates the battery feature implementation of a device based on its
/// feature table.
///
/// Returns [`None`] if the device supports none of the battery features.
pub fn select_battery(
    table: &FeatureTable,
    chan: &Arc<HidppChannel>,
    device_index: u8,
) -> Option<Arc<dyn BatteryFeature>> {
    BATTERY_PRECEDENCE.iter().find_map(|&id| {
        let index = table.index_of(id)?;
        let producer = lookup(id)?.battery?;

        Some(producer(Arc::clone(chan), device_index, index))
    })
}

/// Creates a battery feature with a dynamic return type.
fn new_battery<F: CreatableFeature + BatteryFeature + 'static>(
    chan: Arc<HidppChannel>,
    device_index: u8,
    feature_index: u8,
) -> Arc<dyn BatteryFeature> {
    Arc::new(F::new(chan, device_index, feature_index))
}

const fn named(name: &'static str) -> KnownFeature {
    KnownFeature {
        name,
        battery: None,
    }
}

lazy_static! {
    static ref KNOWN_FEATURES: HashMap<u16, KnownFeature> = HashMap::from([
        (0x0000, named("Root")),
        (0x0001, named("FeatureSet")),
        (0x0002, named("FeatureInfo")),
        (0x0003, named("DeviceInformation")),
        (0x0004, named("UnitId")),
        (0x0005, named("DeviceTypeAndName")),
        (0x0006, named("DeviceGroups")),
        (0x0007, named("DeviceFriendlyName")),
        (0x0008, named("KeepAlive")),
        (0x0020, named("ConfigChange")),
        (0x0021, named("UniqueRandomId")),
        (0x0030, named("TargetSoftware")),
        (0x0080, named("WirelessSignalStrength")),
        (0x00c2, named("DfuControlSigned")),
        (0x00d0, named("Dfu")),
        (0x1000, KnownFeature {
            name: "BatteryStatus",
            battery: Some(new_battery::<BatteryStatusFeature> as BatteryProducer),
        }),
        (0x1001, KnownFeature {
            name: "BatteryVoltage",
            battery: Some(new_battery::<BatteryVoltageFeature> as BatteryProducer),
        }),
        (0x1004, KnownFeature {
            name: "UnifiedBattery",
            battery: Some(new_battery::<UnifiedBatteryFeature> as BatteryProducer),
        }),
        (0x1010, named("ChargingControl")),
        (0x1300, named("LedControl")),
        (0x1802, named("DeviceReset")),
        (0x1814, named("ChangeHost")),
        (0x1815, named("HostsInfo")),
        (0x1981, named("Backlight1")),
        (0x1982, named("Backlight2")),
        (0x1983, named("Backlight3")),
        (0x1b04, named("ReprogControls5")),
        (0x1d4b, named("WirelessDeviceStatus")),
        (0x1df0, named("RemainingPairings")),
        (0x2110, named("SmartShiftWheel")),
        (0x2111, named("SmartShiftWheelEnhanced")),
        (0x2121, named("HiResWheel")),
        (0x2150, named("Thumbwheel")),
        (0x2201, named("AdjustableDpi")),
        (0x2202, named("ExtendedAdjustableDpi")),
        (0x40a3, named("FnInversion")),
        (0x4100, named("Encryption")),
        (0x4220, named("LockKeyState")),
        (0x4521, named("DisableKeys")),
        (0x4540, named("KeyboardInternationalLayouts")),
        (0x6501, named("Gestures2")),
        (0x8060, named("ReportRate")),
        (0x8061, named("ExtendedReportRate")),
        (0x8070, named("ColorLedEffects")),
        (0x8071, named("RgbEffects")),
        (0x8100, named("OnboardProfiles")),
        (0x8110, named("MouseButtonSpy")),
    ]);
}
