//! Implements the device bus of a receiver.
//!
//! The bus owns both HID++ ports of a receiver, the read pumps draining them,
//! the [`HidppChannel`] correlating requests and the registry of
//! [`DeviceSession`]s. The registry is the only place devices are known.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::{
    channel::HidppChannel,
    config::BusConfig,
    device::DeviceSession,
    error::HidppError,
    event::{DeviceMessage, EventEmitter},
    frame::{Frame, ReportKind},
    port::{HidPort, OwnedPort, PortError},
    protocol::v10::{FORCE_ANNOUNCE, RECEIVER_DEVICE_INDEX, ReceiverRegister},
    pump,
};

/// Represents the HID++ bus of a single receiver.
///
/// Dropping the bus disposes it.
pub struct DeviceBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    chan: Arc<HidppChannel>,

    /// The runtime initialization tasks are spawned on.
    runtime: Handle,

    sessions: RwLock<BTreeMap<u8, Arc<DeviceSession>>>,
    events: Arc<EventEmitter<DeviceMessage>>,

    /// Tells the read pumps to stop.
    stop: Arc<AtomicBool>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceBus {
    /// Takes ownership of the short and long report ports of a receiver and
    /// starts reading from them.
    ///
    /// This does not talk to the receiver yet, see [`Self::setup`].
    ///
    /// Returns [`HidppError::NoRuntime`] if called outside of a Tokio runtime.
    pub fn open(
        short: Box<dyn HidPort>,
        long: Box<dyn HidPort>,
        config: BusConfig,
    ) -> Result<Self, HidppError> {
        let runtime = Handle::try_current().map_err(|_| HidppError::NoRuntime)?;

        let short = Arc::new(OwnedPort::new(ReportKind::Short, short));
        let long = Arc::new(OwnedPort::new(ReportKind::Long, long));
        let read_slice = config.read_slice;

        let bus = Self {
            inner: Arc::new(BusInner {
                chan: Arc::new(HidppChannel::new(Arc::clone(&short), Arc::clone(&long), config)),
                runtime,
                sessions: RwLock::new(BTreeMap::new()),
                events: Arc::new(EventEmitter::new()),
                stop: Arc::new(AtomicBool::new(false)),
                pumps: Mutex::new(Vec::with_capacity(2)),
            }),
        };

        for port in [short, long] {
            let weak = Arc::downgrade(&bus.inner);
            let handle = pump::spawn(port, Arc::clone(&bus.inner.stop), read_slice, move |frame| {
                BusInner::route(&weak, frame);
            })
            .map_err(|err| HidppError::Port(PortError::Io(err.to_string())))?;

            bus.inner.pumps.lock().push(handle);
        }

        debug!("opened device bus");
        Ok(bus)
    }

    /// Opens the bus and runs [`Self::setup`].
    pub async fn start(
        short: Box<dyn HidPort>,
        long: Box<dyn HidPort>,
        config: BusConfig,
    ) -> Result<Self, HidppError> {
        let bus = Self::open(short, long, config)?;
        bus.setup().await?;

        Ok(bus)
    }

    /// Discovers the devices connected to the receiver.
    ///
    /// If the receiver reports connected devices, it is asked to announce
    /// them again. Should no announcement arrive in time, device indices are
    /// pinged one by one and every responding device is initialized right
    /// away.
    ///
    /// Returns the amount of devices the receiver reported, or `0` if it did
    /// not answer.
    pub async fn setup(&self) -> Result<u8, HidppError> {
        let chan = &self.inner.chan;
        let config = chan.config();

        let count = match chan.read_register(ReceiverRegister::Connections).await {
            Ok([_, count, _]) => {
                info!(count, "receiver reported connected devices");
                count
            },
            Err(err @ (HidppError::Timeout | HidppError::Hidpp10(_) | HidppError::ProtocolMismatch)) => {
                warn!(%err, "could not read the device count");
                0
            },
            Err(err) => return Err(err),
        };

        if count > 0 {
            match chan
                .write_register(ReceiverRegister::Connections, [FORCE_ANNOUNCE, 0x00, 0x00])
                .await
            {
                Ok(()) => debug!("requested device announcements"),
                Err(err @ (HidppError::Timeout | HidppError::Hidpp10(_) | HidppError::ProtocolMismatch)) => {
                    warn!(%err, "could not request device announcements");
                },
                Err(err) => return Err(err),
            }
        }

        tokio::time::sleep(config.announce_settle).await;

        if self.inner.sessions.read().is_empty() {
            info!("no device announced itself, enumerating manually");
            self.enumerate().await?;
        }

        Ok(count)
    }

    /// Pings every device index and initializes a session for each one that
    /// answers.
    async fn enumerate(&self) -> Result<(), HidppError> {
        let chan = &self.inner.chan;
        let config = chan.config();

        let mut found = Vec::new();
        for device_index in 1..=config.max_device_index {
            match chan
                .ping(device_index, config.enumeration_ping_timeout, true)
                .await
            {
                Ok(true) => {
                    debug!(device_index, "device answered ping");
                    found.push(self.inner.replace_session(device_index));
                },
                Ok(false) => trace!(device_index, "no device answered"),
                Err(HidppError::Disposed) => return Err(HidppError::Disposed),
                Err(err) => debug!(device_index, %err, "ping failed"),
            }
        }

        for session in found {
            match session.initialize().await {
                Ok(()) => {},
                Err(HidppError::Disposed) => return Err(HidppError::Disposed),
                Err(err) => warn!(device_index = session.device_index(), %err, "device initialization failed"),
            }
        }

        Ok(())
    }

    /// The channel requests to the receiver and its devices go through.
    pub fn channel(&self) -> &Arc<HidppChannel> {
        &self.inner.chan
    }

    /// All known sessions, ordered by device index.
    pub fn sessions(&self) -> Vec<Arc<DeviceSession>> {
        self.inner.sessions.read().values().cloned().collect()
    }

    pub fn session(&self, device_index: u8) -> Option<Arc<DeviceSession>> {
        self.inner.sessions.read().get(&device_index).cloned()
    }

    /// Creates a receiver getting every message emitted for the devices of
    /// this bus.
    pub fn subscribe(&self) -> flume::Receiver<DeviceMessage> {
        self.inner.events.create_receiver()
    }

    pub(crate) fn events(&self) -> &EventEmitter<DeviceMessage> {
        &self.inner.events
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.chan.is_disposed()
    }

    /// Stops the read pumps, closes both ports and cancels pending device
    /// initializations.
    ///
    /// Calling this more than once, or from several threads at once, has no
    /// further effect. Requests issued afterwards fail with
    /// [`HidppError::Disposed`].
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for DeviceBus {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl BusInner {
    /// Hands a frame read by a pump to the arrival handling or the request
    /// correlation.
    fn route(weak: &Weak<Self>, frame: Frame) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        if frame.is_arrival() {
            inner.handle_arrival(frame.device_index());
        } else {
            inner.chan.deliver(frame);
        }
    }

    /// Replaces the session of an announced device and schedules its
    /// initialization.
    fn handle_arrival(&self, device_index: u8) {
        if self.chan.is_disposed() || device_index == RECEIVER_DEVICE_INDEX {
            return;
        }

        info!(device_index, "device announced itself");
        let session = self.replace_session(device_index);
        session.schedule_init(&self.runtime, self.chan.config().arrival_settle);
    }

    fn replace_session(&self, device_index: u8) -> Arc<DeviceSession> {
        let session = Arc::new(DeviceSession::new(
            Arc::clone(&self.chan),
            device_index,
            Arc::clone(&self.events),
        ));

        let previous = self
            .sessions
            .write()
            .insert(device_index, Arc::clone(&session));
        if let Some(previous) = previous {
            previous.cancel_init();
            debug!(device_index, "replaced device session");
        }

        session
    }

    fn dispose(&self) {
        self.stop.store(true, Ordering::Release);

        if !self.chan.dispose() {
            return;
        }

        for session in self.sessions.read().values() {
            session.cancel_init();
        }

        let pumps = std::mem::take(&mut *self.pumps.lock());
        let current = thread::current().id();
        for pump in pumps {
            if pump.thread().id() == current {
                continue;
            }
            if pump.join().is_err() {
                warn!("read pump panicked");
            }
        }

        info!("disposed device bus");
    }
}
