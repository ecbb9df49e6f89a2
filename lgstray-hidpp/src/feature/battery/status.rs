//! Implements the `BatteryStatus` feature (ID `0x1000`).

use std::sync::Arc;

use async_trait::async_trait;

use super::{BatteryFeature, BatteryStatus, PowerSupplyStatus};
use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature},
    frame::{Frame, SW_ID},
};

/// Implements the `BatteryStatus` / `0x1000` feature.
#[derive(Clone)]
pub struct BatteryStatusFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for BatteryStatusFeature {
    const ID: u16 = 0x1000;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for BatteryStatusFeature {
}

#[async_trait]
impl BatteryFeature for BatteryStatusFeature {
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

        Ok(decode(response.params()))
    }
}

/// Decodes `[percentage, status, voltage low, voltage high]`, where the
/// voltage is given in units of 10 mV and 2.56 V.
fn decode(params: &[u8]) -> BatteryStatus {
    let param = |index: usize| params.get(index).copied().unwrap_or(0);

    BatteryStatus {
        percentage: param(0).min(100),
        status: PowerSupplyStatus::from_raw(param(1)),
        millivolts: Some(param(2) as u32 * 10 + param(3) as u32 * 2560),
    }
}
