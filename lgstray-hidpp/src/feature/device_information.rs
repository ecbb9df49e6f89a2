//! Implements the `DeviceInformation` feature (ID `0x0003`) that provides some
//! general information about the device.

use std::{fmt::Write, sync::Arc};

use tracing::debug;

use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature},
    frame::{Frame, SW_ID},
};

/// Implements the `DeviceInformation` / `0x0003` feature.
#[derive(Clone)]
pub struct DeviceInformationFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for DeviceInformationFeature {
    const ID: u16 = 0x0003;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for DeviceInformationFeature {
}

impl DeviceInformationFeature {
    /// Retrieves general information about the device and its capabilities.
    pub async fn get_device_info(&self) -> Result<DeviceInformation, HidppError> {
        let params = self.request(0x0).await?.extend_params();

        let mut unit_id = [0u8; 4];
        unit_id.copy_from_slice(&params[1..5]);
        let mut model_id = [0u8; 5];
        model_id.copy_from_slice(&params[7..12]);

        Ok(DeviceInformation {
            entity_count: params[0],
            unit_id,
            model_id,
            serial_number_supported: params[14] & 1 != 0,
        })
    }

    /// Retrieves the 11 byte serial number of the device.
    ///
    /// This function was added in feature version 4 and is rejected by older
    /// devices, so [`DeviceInformation::serial_number_supported`] should be
    /// verified before calling.
    pub async fn get_serial_number(&self) -> Result<[u8; 11], HidppError> {
        let params = self.request(0x2).await?.extend_params();

        let mut serial = [0u8; 11];
        serial.copy_from_slice(&params[..11]);
        Ok(serial)
    }

    /// Builds a stable identifier for the device.
    ///
    /// Devices supporting serial numbers are identified by theirs. All others
    /// are identified by their unit ID followed by their model ID.
    pub async fn get_identifier(&self) -> Result<String, HidppError> {
        let info = self.get_device_info().await?;

        if info.serial_number_supported {
            match self.get_serial_number().await {
                Ok(serial) => return Ok(hex(&serial)),
                Err(HidppError::Disposed) => return Err(HidppError::Disposed),
                Err(err) => {
                    debug!(device_index = self.device_index, %err, "serial number unavailable");
                },
            }
        }

        Ok(info.identifier())
    }

    async fn request(&self, function_id: u8) -> Result<Frame, HidppError> {
        self.chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, function_id, SW_ID, [
                    0x00, 0x00, 0x00,
                ]),
                self.chan.config().feature_timeout,
            )
            .await
    }
}

/// Represents information about the device as reported by
/// [`DeviceInformationFeature::get_device_info`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[non_exhaustive]
pub struct DeviceInformation {
    /// The amount of entities in the device carrying firmware.
    pub entity_count: u8,

    /// A random value identifying the unit among all devices of the same
    /// model.
    pub unit_id: [u8; 4],

    /// The transport specific product IDs identifying the device model.
    pub model_id: [u8; 5],

    /// Whether [`DeviceInformationFeature::get_serial_number`] is supported.
    pub serial_number_supported: bool,
}

impl DeviceInformation {
    /// Renders the unit and model IDs as `UNITID-MODELID` in upper case hex.
    pub fn identifier(&self) -> String {
        format!("{}-{}", hex(&self.unit_id), hex(&self.model_id))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02X}");
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeDevice, FakeReceiver};

    #[tokio::test]
    async fn identifies_by_unit_and_model() {
        let receiver = FakeReceiver::with_devices([(1, FakeDevice::mouse())].into(), false);
        let channel = testing::channel(&receiver, testing::fast_config());
        let feature = DeviceInformationFeature::new(channel, 1, 2);

        assert_eq!(feature.get_identifier().await.unwrap(), "1A2B3C4D-407F000000");
    }

    #[tokio::test]
    async fn prefers_the_serial_number() {
        let mut device = FakeDevice::mouse();
        device.serial = Some(*b"2134LZ0A8F9");
        let receiver = FakeReceiver::with_devices([(1, device)].into(), false);
        let channel = testing::channel(&receiver, testing::fast_config());
        let feature = DeviceInformationFeature::new(channel, 1, 2);

        assert_eq!(feature.get_identifier().await.unwrap(), "323133344C5A3041384639");
    }
}
