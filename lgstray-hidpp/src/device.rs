//! Implements the per-device sessions kept by a [`DeviceBus`](crate::bus::DeviceBus).

use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use tokio::{runtime::Handle, task::AbortHandle};
use tracing::{debug, info, trace, warn};

use crate::{
    channel::HidppChannel,
    error::HidppError,
    event::{DeviceInitMessage, DeviceMessage, EventEmitter},
    feature::{
        CreatableFeature,
        battery::{BatteryFeature, BatteryStatus},
        device_information::DeviceInformationFeature,
        device_type_and_name::{DeviceType, DeviceTypeAndNameFeature},
        feature_set::FeatureSetFeature,
        registry,
        root::RootFeature,
        table::FeatureTable,
    },
};

/// Represents the initialization progress of a [`DeviceSession`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SessionState {
    /// The session was created but initialization has not started yet.
    #[default]
    Created,
    ProbingResponsive,
    DiscoveringFeatures,
    PopulatingIdentity,
    SelectingBattery,

    /// The session is fully initialized and can be polled.
    Initialized,

    /// Every initialization attempt failed. Polls always yield nothing.
    FailedInit,
}

/// Describes who a device is.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceIdentity {
    /// The marketing name of the device.
    pub name: String,

    /// A stable identifier derived from the serial number, or from the unit
    /// and model IDs if the device has no serial number.
    pub identifier: String,

    pub device_type: DeviceType,
}

#[derive(Default)]
struct SessionData {
    state: SessionState,
    identity: Option<DeviceIdentity>,
    features: Arc<FeatureTable>,
    battery: Option<Arc<dyn BatteryFeature>>,
}

/// Represents a single HID++2.0 device paired to a receiver.
///
/// Sessions are never merged: when a device announces itself again, the bus
/// replaces its session with a new one.
pub struct DeviceSession {
    /// The index of the device on the receiver.
    device_index: u8,

    /// The underlying HID++ channel.
    chan: Arc<HidppChannel>,

    /// Receives a [`DeviceInitMessage`] on every successful initialization.
    events: Arc<EventEmitter<DeviceMessage>>,

    data: RwLock<SessionData>,

    /// Serializes concurrent calls to [`Self::initialize`].
    init_lock: tokio::sync::Mutex<()>,

    /// The pending initialization started by [`Self::schedule_init`].
    init_task: Mutex<Option<AbortHandle>>,
}

impl DeviceSession {
    pub(crate) fn new(
        chan: Arc<HidppChannel>,
        device_index: u8,
        events: Arc<EventEmitter<DeviceMessage>>,
    ) -> Self {
        Self {
            device_index,
            chan,
            events,
            data: RwLock::new(SessionData::default()),
            init_lock: tokio::sync::Mutex::new(()),
            init_task: Mutex::new(None),
        }
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    pub fn state(&self) -> SessionState {
        self.data.read().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == SessionState::Initialized
    }

    /// The identity populated by the last successful initialization.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.data.read().identity.clone()
    }

    /// The feature table found by the last feature discovery.
    ///
    /// The table is empty until the first discovery completed.
    pub fn features(&self) -> Arc<FeatureTable> {
        Arc::clone(&self.data.read().features)
    }

    /// The ID of the battery feature selected for polling, if any.
    pub fn battery_feature_id(&self) -> Option<u16> {
        self.data
            .read()
            .battery
            .as_ref()
            .map(|battery| battery.feature_id())
    }

    pub fn has_battery(&self) -> bool {
        self.data.read().battery.is_some()
    }

    /// Initializes the session, retrying failed attempts.
    ///
    /// An attempt pings the device, discovers its features, reads its name
    /// and identifier and selects the battery feature. After
    /// [`BusConfig::init_attempts`](crate::config::BusConfig::init_attempts)
    /// failed attempts, the session is parked in
    /// [`SessionState::FailedInit`].
    ///
    /// Concurrent calls run one after the other.
    pub async fn initialize(&self) -> Result<(), HidppError> {
        let _guard = self.init_lock.lock().await;
        let config = self.chan.config();
        let attempts = config.init_attempts.max(1);

        for attempt in 1..=attempts {
            match self.try_initialize().await {
                Ok((message, changed)) => {
                    info!(
                        device_index = self.device_index,
                        name = %message.device_name,
                        id = %message.device_id,
                        "initialized device"
                    );
                    if changed {
                        self.events.emit(DeviceMessage::Init(message));
                    } else {
                        debug!(device_index = self.device_index, "device identity is unchanged");
                    }
                    return Ok(());
                },
                Err(HidppError::Disposed) => {
                    self.set_state(SessionState::FailedInit);
                    return Err(HidppError::Disposed);
                },
                Err(err) => {
                    warn!(device_index = self.device_index, attempt, %err, "initialization attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(config.init_backoff).await;
                    }
                },
            }
        }

        self.set_state(SessionState::FailedInit);
        Err(HidppError::InitializationFailure {
            device_index: self.device_index,
            attempts,
        })
    }

    /// Runs [`Self::initialize`] on `runtime` after `delay`.
    ///
    /// Failures are logged and otherwise discarded. A previously scheduled
    /// initialization that has not finished yet is cancelled.
    pub fn schedule_init(self: &Arc<Self>, runtime: &Handle, delay: Duration) {
        let session = Arc::clone(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(err) = session.initialize().await {
                warn!(device_index = session.device_index, %err, "device initialization failed");
            }
        });

        if let Some(previous) = self.init_task.lock().replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// Cancels the initialization started by [`Self::schedule_init`], if it is
    /// still running.
    pub fn cancel_init(&self) {
        if let Some(task) = self.init_task.lock().take() {
            task.abort();
        }
    }

    /// Reads the battery of the device.
    ///
    /// Returns [`None`] if the session is not initialized, the device has no
    /// battery feature or the request failed. Errors never escape this call.
    pub async fn poll_battery(&self) -> Option<BatteryStatus> {
        let battery = {
            let data = self.data.read();
            if data.state != SessionState::Initialized {
                return None;
            }
            data.battery.clone()?
        };

        match battery.read_status().await {
            Ok(status) => {
                trace!(device_index = self.device_index, ?status, "read battery");
                Some(status)
            },
            Err(err) => {
                debug!(device_index = self.device_index, %err, "battery poll failed");
                None
            },
        }
    }

    /// Runs a single initialization attempt.
    ///
    /// Also returns whether the identity or battery presence differs from
    /// what the session knew before.
    async fn try_initialize(&self) -> Result<(DeviceInitMessage, bool), HidppError> {
        self.set_state(SessionState::ProbingResponsive);
        self.probe().await?;

        self.set_state(SessionState::DiscoveringFeatures);
        let features = Arc::new(self.discover_features().await?);
        self.data.write().features = Arc::clone(&features);

        self.set_state(SessionState::PopulatingIdentity);
        let identity = self.populate_identity(&features).await?;

        self.set_state(SessionState::SelectingBattery);
        let battery = registry::select_battery(&features, &self.chan, self.device_index);
        if let Some(battery) = &battery {
            debug!(
                device_index = self.device_index,
                feature = registry::name(battery.feature_id()),
                "selected battery feature"
            );
        }

        let message = DeviceInitMessage {
            device_id: identity.identifier.clone(),
            device_name: identity.name.clone(),
            has_battery: battery.is_some(),
            device_type: identity.device_type,
        };

        let mut data = self.data.write();
        let changed =
            data.identity.as_ref() != Some(&identity) || data.battery.is_some() != battery.is_some();
        data.identity = Some(identity);
        data.battery = battery;
        data.state = SessionState::Initialized;

        Ok((message, changed))
    }

    /// Pings the device until it answers.
    async fn probe(&self) -> Result<(), HidppError> {
        let config = self.chan.config();

        for attempt in 1..=config.ping_attempts {
            if self
                .chan
                .ping(self.device_index, config.ping_timeout, true)
                .await?
            {
                return Ok(());
            }

            trace!(device_index = self.device_index, attempt, "ping went unanswered");
            if attempt < config.ping_attempts {
                tokio::time::sleep(config.ping_backoff).await;
            }
        }

        Err(HidppError::Timeout)
    }

    /// Builds a new feature table by walking the `FeatureSet` feature.
    ///
    /// The reported count excludes the root feature at index 0, so the indices
    /// `0..=count` cover the whole table. Indices that go unanswered are left
    /// out.
    async fn discover_features(&self) -> Result<FeatureTable, HidppError> {
        let root = RootFeature::new(Arc::clone(&self.chan), self.device_index, 0);
        let Some(info) = root.get_feature(FeatureSetFeature::ID).await? else {
            return Err(HidppError::MissingFeature(FeatureSetFeature::ID));
        };

        let feature_set = FeatureSetFeature::new(Arc::clone(&self.chan), self.device_index, info.index);
        let count = feature_set.count().await?;

        let mut table = FeatureTable::new();
        for index in 0..=count {
            match feature_set.get_feature(index).await {
                // Only the root feature may live at index 0.
                Ok(feature) if feature.id == 0x0000 && index != 0 => {
                    trace!(device_index = self.device_index, index, "ignored empty feature slot");
                },
                Ok(feature) => {
                    trace!(
                        device_index = self.device_index,
                        index,
                        id = format_args!("{:#06x}", feature.id),
                        name = registry::name(feature.id),
                        "found feature"
                    );
                    table.insert(feature.id, index);
                },
                Err(HidppError::Timeout) => {
                    debug!(device_index = self.device_index, index, "feature index went unanswered");
                },
                Err(err) => return Err(err),
            }
        }

        Ok(table)
    }

    async fn populate_identity(&self, features: &FeatureTable) -> Result<DeviceIdentity, HidppError> {
        let config = self.chan.config();

        let naming_index = features
            .index_of(DeviceTypeAndNameFeature::ID)
            .ok_or(HidppError::MissingFeature(DeviceTypeAndNameFeature::ID))?;
        let naming =
            DeviceTypeAndNameFeature::new(Arc::clone(&self.chan), self.device_index, naming_index);

        let name = naming
            .get_whole_device_name(config.name_chunk_retries, config.name_chunk_backoff)
            .await?;

        let device_type = match naming.get_device_type().await {
            Ok(device_type) => device_type,
            Err(HidppError::Disposed) => return Err(HidppError::Disposed),
            Err(err) => {
                debug!(device_index = self.device_index, %err, "device type unavailable");
                DeviceType::default()
            },
        };

        let info_index = features
            .index_of(DeviceInformationFeature::ID)
            .ok_or(HidppError::MissingFeature(DeviceInformationFeature::ID))?;
        let identifier = DeviceInformationFeature::new(Arc::clone(&self.chan), self.device_index, info_index)
            .get_identifier()
            .await?;

        Ok(DeviceIdentity {
            name,
            identifier,
            device_type,
        })
    }

    fn set_state(&self, state: SessionState) {
        self.data.write().state = state;
    }
}
