//! Implements the `UnifiedBattery` feature (ID `0x1004`).

use std::sync::Arc;

use async_trait::async_trait;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{BatteryFeature, BatteryStatus, PowerSupplyStatus};
use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature},
    frame::{Frame, SW_ID},
};

/// Implements the `UnifiedBattery` / `0x1004` feature.
#[derive(Clone)]
pub struct UnifiedBatteryFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for UnifiedBatteryFeature {
    const ID: u16 = 0x1004;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for UnifiedBatteryFeature {
}

#[async_trait]
impl BatteryFeature for UnifiedBatteryFeature {
    fn feature_id(&self) -> u16 {
        Self::ID
    }

    async fn read_status(&self) -> Result<BatteryStatus, HidppError> {
        let response = self
            .chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, 0x1, SW_ID, [0x00, 0x00, 0x00]),
                self.chan.config().request_timeout,
            )
            .await?;

        // param(3) describes the external power source, which the charging
        // status already covers.
        Ok(decode(response.param(0), response.param(1), response.param(2)))
    }
}

/// Decodes `[percentage, level, charging status]`.
///
/// Devices without percentage support report zero, in which case the
/// percentage is approximated from the level.
fn decode(percentage: u8, level: u8, status: u8) -> BatteryStatus {
    let percentage = match percentage {
        0 => BatteryLevel::highest(level).map_or(0, BatteryLevel::approximate_percentage),
        value => value.min(100),
    };

    let status = match status {
        0 => PowerSupplyStatus::Discharging,
        1 | 2 => PowerSupplyStatus::Charging,
        3 => PowerSupplyStatus::Full,
        _ => PowerSupplyStatus::NotCharging,
    };

    BatteryStatus {
        percentage,
        status,
        millivolts: None,
    }
}

/// Represents an approximate level of the battery charge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum BatteryLevel {
    Critical = 1 << 0,
    Low = 1 << 1,
    Good = 1 << 2,
    Full = 1 << 3,
}

impl BatteryLevel {
    /// Picks the highest level flagged in a level bitfield.
    pub fn highest(bits: u8) -> Option<Self> {
        [Self::Full, Self::Good, Self::Low, Self::Critical]
            .into_iter()
            .find(|&level| bits & u8::from(level) != 0)
    }

    pub fn approximate_percentage(self) -> u8 {
        match self {
            Self::Full => 100,
            Self::Good => 50,
            Self::Low => 20,
            Self::Critical => 5,
        }
    }
}
