//! Implements the `DeviceTypeAndName` feature (ID `0x0005`).

use std::{sync::Arc, time::Duration};

use num_enum::FromPrimitive;
use tracing::debug;

use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature},
    frame::{Frame, SW_ID},
};

/// Implements the `DeviceTypeAndName` / `0x0005` feature.
#[derive(Clone)]
pub struct DeviceTypeAndNameFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for DeviceTypeAndNameFeature {
    const ID: u16 = 0x0005;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for DeviceTypeAndNameFeature {
}

impl DeviceTypeAndNameFeature {
    /// Retrieves the amount of characters in the marketing name of the device.
    pub async fn get_device_name_count(&self) -> Result<u8, HidppError> {
        let response = self.request(0x0, 0x00).await?;
        Ok(response.param(0))
    }

    /// Retrieves a chunk of the marketing name of the device, starting at a
    /// specific index (inclusive).
    ///
    /// Depending on the report size the device answers with, the chunk holds
    /// 3 or 16 bytes, padded with NUL bytes past the end of the name.
    pub async fn get_device_name(&self, index: u8) -> Result<Vec<u8>, HidppError> {
        let response = self.request(0x1, index).await?;
        Ok(response.params().to_vec())
    }

    /// Retrieves the whole marketing name of the device by first calling
    /// [`Self::get_device_name_count`] once and then repeatedly calling
    /// [`Self::get_device_name`] until all characters were received.
    ///
    /// Chunks that go unanswered are requested again after `backoff`, up to
    /// `retries` times in total. Running out of retries before the declared
    /// length is reached fails with [`HidppError::Timeout`].
    pub async fn get_whole_device_name(
        &self,
        retries: u32,
        backoff: Duration,
    ) -> Result<String, HidppError> {
        let count = self.get_device_name_count().await? as usize;
        let mut name = Vec::with_capacity(count);
        let mut failures = 0;

        while name.len() < count {
            match self.get_device_name(name.len() as u8).await {
                Ok(chunk) => {
                    let take = chunk.len().min(count - name.len());
                    name.extend_from_slice(&chunk[..take]);
                },
                Err(HidppError::Timeout) if failures + 1 < retries => {
                    failures += 1;
                    debug!(
                        device_index = self.device_index,
                        offset = name.len(),
                        "device name chunk went unanswered"
                    );
                    tokio::time::sleep(backoff).await;
                },
                Err(err) => return Err(err),
            }
        }

        Ok(String::from_utf8_lossy(&name)
            .trim_end_matches('\0')
            .to_string())
    }

    /// Retrieves the marketing type of the device.
    ///
    /// Types this crate does not know are kept as [`DeviceType::Other`].
    pub async fn get_device_type(&self) -> Result<DeviceType, HidppError> {
        let response = self.request(0x2, 0x00).await?;

        Ok(DeviceType::from(response.param(0)))
    }

    async fn request(&self, function_id: u8, param: u8) -> Result<Frame, HidppError> {
        self.chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, function_id, SW_ID, [
                    param, 0x00, 0x00,
                ]),
                self.chan.config().feature_timeout,
            )
            .await
    }
}

/// Represents the type of a HID++2.0 device as returned by the
/// [`DeviceTypeAndNameFeature`] feature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
#[repr(u8)]
pub enum DeviceType {
    Keyboard = 0,
    RemoteControl = 1,
    Numpad = 2,
    Mouse = 3,
    Trackpad = 4,
    Trackball = 5,
    Presenter = 6,
    Receiver = 7,
    Headset = 8,
    Webcam = 9,
    SteeringWheel = 10,
    Joystick = 11,
    Gamepad = 12,
    Dock = 13,
    Speaker = 14,
    Microphone = 15,
    IlluminationLight = 16,
    ProgrammableController = 17,
    CarSimPedals = 18,
    Adapter = 19,
    #[num_enum(catch_all)]
    Other(u8),
}

/// Assumed for devices that do not report their type.
impl Default for DeviceType {
    fn default() -> Self {
        Self::Mouse
    }
}
