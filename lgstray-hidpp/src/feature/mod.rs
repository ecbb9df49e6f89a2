//! Specific device feature implementations.
//!
//! Only the features needed to identify a device and read its battery are
//! implemented. [`registry`] knows the names of many more, which are used for
//! logging during feature discovery.

use std::sync::Arc;

use crate::channel::HidppChannel;

pub mod battery;
pub mod device_information;
pub mod device_type_and_name;
pub mod feature_set;
pub mod registry;
pub mod root;
pub mod table;

/// Represents a concrete implementation of a HID++2.0 device feature.
pub trait Feature: Send + Sync {}

/// Represents a [`Feature`] that can be instantiated from its location in the
/// feature table of a device.
pub trait CreatableFeature: Feature {
    /// The protocol ID of the implemented feature.
    const ID: u16;

    /// Creates a new instance of the feature implementation.
    fn new(chan: Arc<HidppChannel>, device_index: u8, feature_index: u8) -> Self;
}

/// A bitfield describing some properties of a feature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureType {
    /// The feature was replaced by a newer one and is only advertised for
    /// older software.
    pub obsolete: bool,

    /// The feature should not be managed by end user software.
    pub hidden: bool,

    /// The feature is used for internal testing and manufacturing.
    pub engineering: bool,
}

impl From<u8> for FeatureType {
    fn from(value: u8) -> Self {
        Self {
            obsolete: value & (1 << 7) != 0,
            hidden: value & (1 << 6) != 0,
            engineering: value & (1 << 5) != 0,
        }
    }
}
