//! Implements the `BatteryVoltage` feature (ID `0x1001`).

use std::sync::Arc;

use async_trait::async_trait;

use super::{BatteryFeature, BatteryStatus, PowerSupplyStatus};
use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature},
    frame::{Frame, SW_ID},
};

/// Discharge curve of a typical lithium-ion cell, as `(millivolts, percent)`
/// pairs in descending order.
const DISCHARGE_CURVE: [(u32, u8); 13] = [
    (4186, 100),
    (4067, 90),
    (3989, 80),
    (3922, 70),
    (3859, 60),
    (3811, 50),
    (3778, 40),
    (3751, 30),
    (3717, 20),
    (3671, 10),
    (3646, 5),
    (3579, 2),
    (3500, 0),
];

/// Implements the `BatteryVoltage` / `0x1001` feature.
///
/// Devices speaking this feature only report the voltage, so the percentage
/// is estimated with [`estimate_percentage`].
#[derive(Clone)]
pub struct BatteryVoltageFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for BatteryVoltageFeature {
    const ID: u16 = 0x1001;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for BatteryVoltageFeature {
}

#[async_trait]
impl BatteryFeature for BatteryVoltageFeature {
    fn feature_id(&self) -> u16 {
        Self::ID
    }

    async fn read_status(&self) -> Result<BatteryStatus, HidppError> {
        let response = self
            .chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, 0x0, SW_ID, [0x00, 0x00, 0x00]),
                self.chan.config().request_timeout,
            )
            .await?;

        Ok(decode(response.param(0), response.param(1), response.param(2)))
    }
}

/// Decodes the big endian voltage and the flags byte.
///
/// Bit 7 of the flags is set while external power is connected, in which case
/// bits 0 to 2 tell the charging state.
fn decode(hi: u8, lo: u8, flags: u8) -> BatteryStatus {
    let millivolts = u16::from_be_bytes([hi, lo]) as u32;

    let status = if flags & 0x80 == 0 {
        PowerSupplyStatus::Discharging
    } else {
        match flags & 0x07 {
            0 => PowerSupplyStatus::Charging,
            1 => PowerSupplyStatus::Full,
            2 => PowerSupplyStatus::NotCharging,
            _ => PowerSupplyStatus::Unknown,
        }
    };

    BatteryStatus {
        percentage: estimate_percentage(millivolts),
        status,
        millivolts: Some(millivolts),
    }
}

/// Estimates the charge of a lithium-ion battery from its voltage by linear
/// interpolation on a typical discharge curve.
pub fn estimate_percentage(millivolts: u32) -> u8 {
    let (max_mv, max_pct) = DISCHARGE_CURVE[0];
    if millivolts >= max_mv {
        return max_pct;
    }

    for pair in DISCHARGE_CURVE.windows(2) {
        let (upper_mv, upper_pct) = pair[0];
        let (lower_mv, lower_pct) = pair[1];

        if millivolts > lower_mv {
            let span = (upper_pct - lower_pct) as u32;
            let offset = (millivolts - lower_mv) * span / (upper_mv - lower_mv);
            return lower_pct + offset as u8;
        }
    }

    0
}
