//! Implements the `FeatureSet` feature (ID `0x0001`).

use std::sync::Arc;

use crate::{
    channel::HidppChannel,
    error::HidppError,
    feature::{CreatableFeature, Feature, FeatureType},
    frame::{Frame, SW_ID},
};

/// Implements the `FeatureSet` / `0x0001` feature.
///
/// This feature is used to collect all features supported by the device. To
/// achieve this, call [`Self::count`] to retrieve the amount of supported
/// features (excluding the root feature), then call [`Self::get_feature`] for
/// every index up to and including that count.
#[derive(Clone)]
pub struct FeatureSetFeature {
    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// The index of the device to implement the feature for.
    device_index: u8,

    /// The index of the feature in the feature table.
    feature_index: u8,
}

impl CreatableFeature for FeatureSetFeature {
    const ID: u16 = 0x0001;

    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self {
        Self {
            chan,
            device_index,
            feature_index,
        }
    }
}

impl Feature for FeatureSetFeature {
}

impl FeatureSetFeature {
    /// Retrieves the amount of features supported by the device, not including
    /// the root feature.
    pub async fn count(&self) -> Result<u8, HidppError> {
        let response = self
            .chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, 0x0, SW_ID, [0x00, 0x00, 0x00]),
                self.chan.config().feature_timeout,
            )
            .await?;

        Ok(response.param(0))
    }

    /// Retrieves the information about a specific feature based on its index in
    /// the feature table.
    pub async fn get_feature(&self, index: u8) -> Result<FeatureInformation, HidppError> {
        let response = self
            .chan
            .send_v20(
                Frame::short(self.device_index, self.feature_index, 0x1, SW_ID, [index, 0x00, 0x00]),
                self.chan.config().feature_timeout,
            )
            .await?;

        Ok(FeatureInformation {
            id: u16::from_be_bytes([response.param(0), response.param(1)]),
            typ: FeatureType::from(response.param(2)),
            version: response.param(3),
        })
    }
}

/// Represents information about a specific feature as returned by the
/// [`FeatureSetFeature::get_feature`] function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[non_exhaustive]
pub struct FeatureInformation {
    /// The protocol ID of the feature.
    pub id: u16,

    /// The type of the feature.
    pub typ: FeatureType,

    /// The latest supported version of the feature.
    ///
    /// This field was added in feature version 1 and will be `0` for all older
    /// versions.
    pub version: u8,
}
