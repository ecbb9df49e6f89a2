//! A scripted receiver used by the unit tests in place of real hardware.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    channel::HidppChannel,
    config::BusConfig,
    frame::{Frame, LONG_REPORT_ID, LONG_REPORT_LENGTH, ReportKind},
    port::{HidPort, OwnedPort, PortError},
    protocol::v20,
    pump,
};

type Responder = Arc<dyn Fn(&Frame) -> Vec<Frame> + Send + Sync>;

/// Timings short enough to keep the tests fast.
pub(crate) fn fast_config() -> BusConfig {
    BusConfig {
        read_slice: Duration::from_millis(5),
        permit_wait: Duration::from_millis(500),
        request_timeout: Duration::from_millis(100),
        setup_timeout: Duration::from_millis(300),
        feature_timeout: Duration::from_millis(200),
        ping_timeout: Duration::from_millis(100),
        enumeration_ping_timeout: Duration::from_millis(100),
        arrival_settle: Duration::from_millis(10),
        announce_settle: Duration::from_millis(150),
        ping_attempts: 3,
        ping_backoff: Duration::from_millis(5),
        init_attempts: 3,
        init_backoff: Duration::from_millis(10),
        name_chunk_retries: 3,
        name_chunk_backoff: Duration::from_millis(5),
        max_device_index: 6,
        inbound_capacity: 5,
    }
}

/// Creates a channel on top of `receiver` with both read pumps running.
///
/// The pumps stop once the ports are closed or the receiver is dropped.
pub(crate) fn channel(receiver: &FakeReceiver, config: BusConfig) -> Arc<HidppChannel> {
    let (short, long) = receiver.ports();
    let short = Arc::new(OwnedPort::new(ReportKind::Short, short));
    let long = Arc::new(OwnedPort::new(ReportKind::Long, long));
    let channel = Arc::new(HidppChannel::new(
        Arc::clone(&short),
        Arc::clone(&long),
        config.clone(),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    for port in [short, long] {
        let weak = Arc::downgrade(&channel);
        pump::spawn(port, Arc::clone(&stop), config.read_slice, move |frame| {
            if let Some(channel) = weak.upgrade() {
                channel.deliver(frame);
            }
        })
        .expect("could not spawn read pump");
    }

    channel
}

/// Builds the arrival notification a receiver sends for a connected device.
pub(crate) fn arrival(device_index: u8) -> Frame {
    Frame::short_v10(device_index, 0x41, [0x04, 0x02, 0x8a, 0x40])
}

struct PortState {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    closes: AtomicUsize,
    failing: AtomicBool,
}

impl PortState {
    fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            closes: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }
}

struct Shared {
    short: PortState,
    long: PortState,
    alive: AtomicBool,
    writes: Mutex<Vec<Frame>>,
    responder: Mutex<Option<Responder>>,
    reply_delay: Mutex<Duration>,
    outstanding: AtomicUsize,
    max_outstanding_at_write: AtomicUsize,
}

impl Shared {
    fn port(&self, kind: ReportKind) -> &PortState {
        match kind {
            ReportKind::Short => &self.short,
            ReportKind::Long => &self.long,
        }
    }

    fn inject(&self, frame: Frame) {
        let _ = self.port(frame.kind()).tx.send(frame.as_bytes().to_vec());
    }

    fn on_write(self: &Arc<Self>, frame: Frame) {
        self.max_outstanding_at_write
            .fetch_max(self.outstanding.load(Ordering::SeqCst), Ordering::SeqCst);
        self.writes.lock().push(frame);

        let responder = self.responder.lock().clone();
        let replies = responder.map(|respond| respond(&frame)).unwrap_or_default();
        if replies.is_empty() {
            return;
        }

        let delay = *self.reply_delay.lock();
        if delay.is_zero() {
            replies.into_iter().for_each(|reply| self.inject(reply));
            return;
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(self);
        thread::spawn(move || {
            thread::sleep(delay);
            shared.outstanding.fetch_sub(1, Ordering::SeqCst);
            replies.into_iter().for_each(|reply| shared.inject(reply));
        });
    }
}

struct FakePort {
    kind: ReportKind,
    shared: Arc<Shared>,
}

impl HidPort for FakePort {
    fn write_report(&self, src: &[u8]) -> Result<usize, PortError> {
        let frame = Frame::from_bytes(src).map_err(|err| PortError::Io(err.to_string()))?;
        self.shared.on_write(frame);
        Ok(src.len())
    }

    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        let state = self.shared.port(self.kind);
        if state.failing.load(Ordering::SeqCst) {
            return Err(PortError::Io("injected read failure".into()));
        }
        if !self.shared.alive.load(Ordering::SeqCst) {
            return Err(PortError::Io("the fake receiver is gone".into()));
        }

        match state.rx.recv_timeout(timeout) {
            Ok(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            },
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(PortError::Closed),
        }
    }

    fn close(&self) {
        self.shared.port(self.kind).closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Emulates a receiver exposing a short and a long HID++ port.
///
/// Every written frame is recorded and handed to the responder, whose replies
/// are read back from the port matching their size.
pub(crate) struct FakeReceiver {
    shared: Arc<Shared>,
}

impl FakeReceiver {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                short: PortState::new(),
                long: PortState::new(),
                alive: AtomicBool::new(true),
                writes: Mutex::new(Vec::new()),
                responder: Mutex::new(None),
                reply_delay: Mutex::new(Duration::ZERO),
                outstanding: AtomicUsize::new(0),
                max_outstanding_at_write: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a receiver with paired HID++2.0 devices.
    ///
    /// The receiver answers the connection register and, if `announces` is
    /// set, sends an arrival for every device when asked to. Requests to
    /// unpaired device indices are answered with a HID++1.0 error.
    pub(crate) fn with_devices(devices: BTreeMap<u8, FakeDevice>, announces: bool) -> Self {
        let receiver = Self::new();
        receiver.pair(devices, announces);
        receiver
    }

    /// Replaces the paired devices, as if they were re-paired or updated.
    pub(crate) fn pair(&self, devices: BTreeMap<u8, FakeDevice>, announces: bool) {
        self.respond_with(move |request| {
            if request.device_index() == 0xff {
                return match (request.sub_id(), request.as_bytes()[3]) {
                    (0x81, 0x02) => vec![Frame::short_v10(0xff, 0x81, [
                        0x02,
                        0x00,
                        devices.len() as u8,
                        0x00,
                    ])],
                    (0x80, 0x02) => {
                        let mut replies = vec![Frame::short_v10(0xff, 0x80, [0x02, 0x00, 0x00, 0x00])];
                        if announces {
                            replies.extend(devices.keys().map(|&index| arrival(index)));
                        }
                        replies
                    },
                    _ => Vec::new(),
                };
            }

            match devices.get(&request.device_index()) {
                Some(device) => device.respond(request).into_iter().collect(),
                None => vec![Frame::short_v10(request.device_index(), 0x8f, [
                    request.feature_index(),
                    request.as_bytes()[3],
                    0x08,
                    0x00,
                ])],
            }
        });
    }

    /// Creates a pair of ports sharing this receiver's state.
    pub(crate) fn ports(&self) -> (Box<dyn HidPort>, Box<dyn HidPort>) {
        (
            Box::new(FakePort {
                kind: ReportKind::Short,
                shared: Arc::clone(&self.shared),
            }),
            Box::new(FakePort {
                kind: ReportKind::Long,
                shared: Arc::clone(&self.shared),
            }),
        )
    }

    pub(crate) fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Frame) -> Vec<Frame> + Send + Sync + 'static,
    {
        *self.shared.responder.lock() = Some(Arc::new(responder));
    }

    /// Delays every reply by `delay`, sending it from a separate thread.
    pub(crate) fn set_reply_delay(&self, delay: Duration) {
        *self.shared.reply_delay.lock() = delay;
    }

    pub(crate) fn inject(&self, frame: Frame) {
        self.shared.inject(frame);
    }

    pub(crate) fn inject_raw(&self, kind: ReportKind, data: &[u8]) {
        let _ = self.shared.port(kind).tx.send(data.to_vec());
    }

    pub(crate) fn fail_reads(&self, kind: ReportKind) {
        self.shared.port(kind).failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn writes(&self) -> Vec<Frame> {
        self.shared.writes.lock().clone()
    }

    pub(crate) fn close_count(&self, kind: ReportKind) -> usize {
        self.shared.port(kind).closes.load(Ordering::SeqCst)
    }

    /// The highest amount of unanswered requests seen when a new request was
    /// written.
    pub(crate) fn max_outstanding_at_write(&self) -> usize {
        self.shared.max_outstanding_at_write.load(Ordering::SeqCst)
    }
}

impl Drop for FakeReceiver {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
    }
}

/// Emulates a HID++2.0 device behind a receiver.
#[derive(Clone)]
pub(crate) struct FakeDevice {
    /// The feature IDs in the order of their feature index.
    pub features: Vec<u16>,
    pub name: String,
    pub device_type: u8,
    pub unit_id: [u8; 4],
    pub model_id: [u8; 5],
    pub serial: Option<[u8; 11]>,

    /// The parameters returned by whichever battery feature is requested.
    pub battery: Vec<u8>,

    /// Feature indices whose `FeatureSet` lookup is never answered.
    pub hidden_indices: Vec<u8>,

    /// Answers name requests with short reports, 3 characters at a time.
    pub short_name_chunks: bool,

    /// The amount of name chunk requests left unanswered.
    pub silent_name_chunks: Arc<AtomicU32>,
}

impl FakeDevice {
    pub(crate) fn mouse() -> Self {
        Self {
            features: vec![0x0000, 0x0001, 0x0003, 0x0005, 0x1d4b, 0x1000],
            name: "G502 LIGHTSPEED".into(),
            device_type: 3,
            unit_id: [0x1a, 0x2b, 0x3c, 0x4d],
            model_id: [0x40, 0x7f, 0x00, 0x00, 0x00],
            serial: None,
            battery: vec![0x64, 0x03, 0x05, 0x02],
            hidden_indices: Vec::new(),
            short_name_chunks: false,
            silent_name_chunks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub(crate) fn with_features(mut self, features: &[u16]) -> Self {
        self.features = features.to_vec();
        self
    }

    pub(crate) fn with_battery(mut self, battery: &[u8]) -> Self {
        self.battery = battery.to_vec();
        self
    }

    pub(crate) fn respond(&self, request: &Frame) -> Option<Frame> {
        let feature_index = request.feature_index();
        let Some(&feature_id) = self.features.get(feature_index as usize) else {
            return Some(v20_error(request, v20::ErrorType::InvalidFeatureIndex));
        };

        let function = request.function_id();
        let params = match (feature_id, function) {
            (0x0000, 0) => {
                let wanted = u16::from_be_bytes([request.param(0), request.param(1)]);
                let index = self.features.iter().position(|&id| id == wanted).unwrap_or(0);
                vec![index as u8, 0x00, 0x00]
            },
            (0x0000, 1) => vec![0x04, 0x05, request.param(2)],
            (0x0001, 0) => vec![(self.features.len() - 1) as u8],
            (0x0001, 1) => {
                let index = request.param(0);
                if self.hidden_indices.contains(&index) {
                    return None;
                }
                match self.features.get(index as usize) {
                    Some(&id) => vec![(id >> 8) as u8, id as u8, 0x00, 0x00],
                    None => return Some(v20_error(request, v20::ErrorType::OutOfRange)),
                }
            },
            (0x0003, 0) => {
                let mut params = vec![0u8; 16];
                params[0] = 1;
                params[1..5].copy_from_slice(&self.unit_id);
                params[6] = 0x04;
                params[7..12].copy_from_slice(&self.model_id);
                params[14] = self.serial.is_some() as u8;
                params
            },
            (0x0003, 2) => match self.serial {
                Some(serial) => serial.to_vec(),
                None => return Some(v20_error(request, v20::ErrorType::InvalidFunctionId)),
            },
            (0x0005, 0) => vec![self.name.len() as u8],
            (0x0005, 1) => {
                let silent = self
                    .silent_name_chunks
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
                if silent.is_ok() {
                    return None;
                }

                let start = request.param(0) as usize;
                let take = if self.short_name_chunks { 3 } else { 16 };
                let chunk: Vec<u8> = self.name.bytes().skip(start).take(take).collect();
                if self.short_name_chunks {
                    let mut params = [0u8; 3];
                    params[..chunk.len()].copy_from_slice(&chunk);
                    return Some(Frame::short(
                        request.device_index(),
                        feature_index,
                        function,
                        request.software_id(),
                        params,
                    ));
                }
                chunk
            },
            (0x0005, 2) => vec![self.device_type],
            (0x1000, 1) | (0x1001, 0) | (0x1004, 1) => self.battery.clone(),
            _ => return Some(v20_error(request, v20::ErrorType::InvalidFunctionId)),
        };

        Some(Frame::long(
            request.device_index(),
            feature_index,
            function,
            request.software_id(),
            &params,
        ))
    }
}

/// Builds the HID++2.0 error report rejecting `request`.
fn v20_error(request: &Frame, error: v20::ErrorType) -> Frame {
    let mut data = [0u8; LONG_REPORT_LENGTH];
    data[0] = LONG_REPORT_ID;
    data[1] = request.device_index();
    data[2] = v20::ERROR_FEATURE_INDEX;
    data[3] = request.feature_index();
    data[4] = request.as_bytes()[3];
    data[5] = error.into();

    Frame::Long(data)
}
