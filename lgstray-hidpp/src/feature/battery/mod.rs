//! Implements the battery reporting features.
//!
//! Devices report their battery through one of three mutually exclusive
//! features. Each of them is implemented as a [`BatteryFeature`], so a device
//! session can poll whichever one its device supports without knowing the
//! dialect.

use async_trait::async_trait;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::Feature;
use crate::error::HidppError;

mod status;
mod unified;
mod voltage;

pub use status::BatteryStatusFeature;
pub use unified::{BatteryLevel, UnifiedBatteryFeature};
pub use voltage::{BatteryVoltageFeature, estimate_percentage};

/// Represents a feature able to report the battery state of a device.
#[async_trait]
pub trait BatteryFeature: Feature {
    /// The protocol ID of the feature.
    fn feature_id(&self) -> u16;

    /// Requests and decodes the current battery state.
    ///
    /// A missing reply results in [`HidppError::Timeout`] rather than an
    /// empty status.
    async fn read_status(&self) -> Result<BatteryStatus, HidppError>;
}

/// Represents a single battery reading.
///
/// Readings are never updated in place; every poll produces a new one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatteryStatus {
    /// The charge of the battery in percent (`0..=100`).
    pub percentage: u8,

    /// What the battery is currently doing.
    pub status: PowerSupplyStatus,

    /// The battery voltage in millivolts, if the feature reports it.
    pub millivolts: Option<u32>,
}

/// Represents the charging state of a battery.
///
/// The numbering follows the Linux power supply class, which is also what
/// devices speaking the `BatteryStatus` feature report directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum PowerSupplyStatus {
    #[default]
    Unknown = 0,
    Charging = 1,
    Discharging = 2,
    NotCharging = 3,
    Full = 4,
}

impl PowerSupplyStatus {
    /// Decodes a raw status byte, mapping unknown values to
    /// [`Self::Unknown`].
    pub fn from_raw(value: u8) -> Self {
        Self::try_from(value).unwrap_or_default()
    }
}
