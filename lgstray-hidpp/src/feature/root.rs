//! Implements the Root feature (ID `0x0000`) that every device supports by
//! default.

use std::sync::Arc;

use super::{CreatableFeature, Feature, FeatureType};
use crate::{
    channel::HidppChannel,
    error::HidppError,
    frame::{Frame, SW_ID},
};

/// Implements the `Root` / `0x0000` feature that every HID++2.0 device
/// supports at feature index 0.
///
/// Responsiveness checks are done with [`HidppChannel::ping`], which uses the
/// ping function of this feature.
#[derive(Clone)]
pub struct RootFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,
}

impl CreatableFeature for RootFeature {
    const ID: u16 = 0x0000;

    fn new(chan: Arc<HidppChannel>, device_index: u8, _: u8) -> Self {
        Self {
            chan,
            device_index,
        }
    }
}

impl Feature for RootFeature {
}

impl RootFeature {
    /// Looks up the index of a feature in the feature table of the device.
    ///
    /// If the feature is not supported by the device, [`None`] is returned.
    pub async fn get_feature(&self, id: u16) -> Result<Option<FeatureInformation>, HidppError> {
        let [hi, lo] = id.to_be_bytes();
        let response = self
            .chan
            .send_v20(
                Frame::short(self.device_index, 0x00, 0x0, SW_ID, [hi, lo, 0x00]),
                self.chan.config().feature_timeout,
            )
            .await?;

        if response.param(0) == 0 {
            return Ok(None);
        }

        Ok(Some(FeatureInformation {
            index: response.param(0),
            typ: FeatureType::from(response.param(1)),
            version: response.param(2),
        }))
    }
}

/// Represents information about a specific feature as returned by the
/// [`RootFeature::get_feature`] function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FeatureInformation {
    /// The index of the feature in the feature table.
    /// This is used for invocations of functions of that feature.
    pub index: u8,

    /// The type of the feature.
    pub typ: FeatureType,

    /// The latest supported version of the feature.
    pub version: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeDevice, FakeReceiver};

    #[tokio::test]
    async fn looks_up_feature_indices() {
        let receiver = FakeReceiver::with_devices([(1, FakeDevice::mouse())].into(), false);
        let channel = testing::channel(&receiver, testing::fast_config());
        let root = RootFeature::new(channel, 1, 0);

        assert_eq!(root.get_feature(0x0005).await.unwrap().map(|info| info.index), Some(3));
        assert_eq!(root.get_feature(0x1004).await.unwrap(), None);
    }
}
