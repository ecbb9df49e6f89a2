//! Periodic battery polling of the devices on a [`DeviceBus`].

use std::{sync::Arc, time::Duration};

use chrono::Local;
use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, trace};

use crate::{
    bus::DeviceBus,
    error::HidppError,
    event::{DeviceMessage, DeviceUpdateMessage},
};

/// Polls the battery of every initialized device once and emits a
/// [`DeviceUpdateMessage`] for each successful reading.
///
/// Devices that could not be read are skipped. The emitted messages are
/// returned as well.
pub async fn poll_devices(bus: &DeviceBus) -> Vec<DeviceUpdateMessage> {
    let mut updates = Vec::new();

    for session in bus.sessions() {
        if !session.is_initialized() {
            continue;
        }
        let Some(identity) = session.identity() else {
            continue;
        };
        let Some(status) = session.poll_battery().await else {
            trace!(device_index = session.device_index(), "no battery reading");
            continue;
        };

        let update = DeviceUpdateMessage::new(
            identity.identifier,
            identity.name,
            identity.device_type,
            status,
            Local::now(),
        );
        bus.events().emit(DeviceMessage::Update(update.clone()));
        updates.push(update);
    }

    updates
}

/// A recurring task running [`poll_devices`].
///
/// The task ends when [`Self::stop`] is called, the poller is dropped or the
/// bus is disposed.
pub struct BatteryPoller {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BatteryPoller {
    /// Starts polling `bus` every `interval`, beginning right away.
    ///
    /// Returns [`HidppError::NoRuntime`] if called outside of a Tokio runtime.
    pub fn spawn(bus: Arc<DeviceBus>, interval: Duration) -> Result<Self, HidppError> {
        let runtime = Handle::try_current().map_err(|_| HidppError::NoRuntime)?;
        let (stop, mut stopped) = oneshot::channel();

        let task = runtime.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticks.tick() => {},
                }

                if bus.is_disposed() {
                    break;
                }

                let updates = poll_devices(&bus).await;
                debug!(updates = updates.len(), "polled batteries");
            }

            debug!("battery poller stopped");
        });

        Ok(Self {
            stop: Some(stop),
            task,
        })
    }

    /// Whether the polling task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops polling and waits for a poll in progress to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        let _ = (&mut self.task).await;
    }
}

impl Drop for BatteryPoller {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.task.abort();
        }
    }
}
