//! Implements request/response messaging across the two HID++ ports of a
//! receiver.
//!
//! HID++ replies carry no request identifier. The only way to map a reply to
//! its request is the echoed device index, feature index and software ID, so
//! [`HidppChannel`] allows exactly one request to be in flight at any time.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, trace};

use crate::{
    config::BusConfig,
    error::HidppError,
    frame::{Frame, ReportKind, SW_ID},
    port::{OwnedPort, PortError},
    protocol::{
        MatchMode,
        Verdict,
        v10::{self, ReceiverRegister},
    },
    queue::{BoundedQueue, OverflowPolicy},
};

/// Represents the HID++ communication channel of a single receiver.
///
/// Frames read by the pumps are handed to [`Self::deliver`] and consumed by
/// whichever request is currently waiting for its reply.
pub struct HidppChannel {
    /// The port carrying short (7 byte) reports.
    short: Arc<OwnedPort>,

    /// The port carrying long (20 byte) reports.
    long: Arc<OwnedPort>,

    /// Held for the whole write and reply wait of a request.
    permit: Mutex<()>,

    /// Frames that may answer the in-flight request.
    inbound: BoundedQueue<Frame>,

    /// Set once by [`Self::dispose`].
    disposed: AtomicBool,

    /// The timings used by requests issued through this channel.
    config: BusConfig,
}

impl HidppChannel {
    pub(crate) fn new(short: Arc<OwnedPort>, long: Arc<OwnedPort>, config: BusConfig) -> Self {
        Self {
            short,
            long,
            permit: Mutex::new(()),
            inbound: BoundedQueue::new(config.inbound_capacity, OverflowPolicy::DropOldest),
            disposed: AtomicBool::new(false),
            config,
        }
    }

    /// The timings this channel was created with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Queues a frame that is not an arrival notification for the request
    /// correlation.
    pub(crate) fn deliver(&self, frame: Frame) {
        if let Some(dropped) = self.inbound.push(frame) {
            trace!(?dropped, "inbound queue full, dropped oldest frame");
        }
    }

    /// Writes `request` to the port matching its report size and waits for
    /// the first frame `mode` accepts as its reply.
    ///
    /// Returns `Ok(None)` if the request permit could not be obtained within
    /// [`BusConfig::permit_wait`], if no reply arrived within `timeout` or if
    /// the device rejected the request.
    pub async fn write_read(
        &self,
        request: Frame,
        timeout: Duration,
        mode: MatchMode,
    ) -> Result<Option<Frame>, HidppError> {
        self.ensure_alive()?;

        let Ok(_permit) = tokio::time::timeout(self.config.permit_wait, self.permit.lock()).await
        else {
            debug!(?request, "request permit is busy");
            return Ok(None);
        };

        self.ensure_alive()?;

        // Replies to abandoned requests must not be taken for ours.
        let stale = self.inbound.clear();
        if stale > 0 {
            trace!(stale, "discarded stale frames");
        }

        self.port(request.kind())
            .write_report(request.as_bytes())
            .map_err(|err| self.map_port_error(err))?;
        trace!(?request, "sent request");

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(reply) = self.inbound.pop_timeout(remaining).await else {
                self.ensure_alive()?;
                return Ok(None);
            };

            match mode.evaluate(&request, &reply) {
                Verdict::Accept => return Ok(Some(reply)),
                Verdict::Abort => return Ok(None),
                Verdict::Skip => trace!(?reply, "skipped unrelated frame"),
            }
        }
    }

    /// Sends a HID++2.0 request and waits for its reply.
    ///
    /// Unlike [`Self::write_read`], a missing reply is an error.
    pub async fn send_v20(&self, request: Frame, timeout: Duration) -> Result<Frame, HidppError> {
        self.write_read(request, timeout, MatchMode::Hidpp20)
            .await?
            .ok_or(HidppError::Timeout)
    }

    /// Checks whether a HID++2.0 device answers at `device_index`.
    ///
    /// The root feature echoes an arbitrary byte, which has to come back
    /// unchanged. In `strict` mode, a HID++1.0 error for the device index ends
    /// the wait immediately.
    pub async fn ping(
        &self,
        device_index: u8,
        timeout: Duration,
        strict: bool,
    ) -> Result<bool, HidppError> {
        let data = rand::random::<u8>();
        let mode = if strict {
            MatchMode::Hidpp20Strict
        } else {
            MatchMode::Hidpp20
        };

        let reply = self
            .write_read(Frame::short(device_index, 0x00, 0x1, SW_ID, [0x00, 0x00, data]), timeout, mode)
            .await?;

        Ok(reply.is_some_and(|reply| reply.param(2) == data))
    }

    /// Reads a 3-byte register of the receiver.
    pub async fn read_register(&self, register: ReceiverRegister) -> Result<[u8; 3], HidppError> {
        let reply = self.register_access(v10::read_register(register)).await?;
        let bytes = reply.as_bytes();

        Ok([bytes[4], bytes[5], bytes[6]])
    }

    /// Writes a 3-byte register of the receiver.
    pub async fn write_register(
        &self,
        register: ReceiverRegister,
        value: [u8; 3],
    ) -> Result<(), HidppError> {
        self.register_access(v10::write_register(register, value))
            .await
            .map(|_| ())
    }

    async fn register_access(&self, request: Frame) -> Result<Frame, HidppError> {
        let reply = self
            .write_read(request, self.config.setup_timeout, MatchMode::Hidpp10)
            .await?
            .ok_or(HidppError::Timeout)?;

        if reply.is_hidpp10_error() {
            return Err(v10::error_of(&reply).map_or(HidppError::ProtocolMismatch, HidppError::Hidpp10));
        }

        Ok(reply)
    }

    /// Marks the channel as disposed and closes both ports.
    ///
    /// Returns whether this call disposed the channel.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.inbound.clear();
        for port in [&self.short, &self.long] {
            if port.close() {
                debug!(port = ?port.kind(), "closed port");
            }
        }

        true
    }

    fn port(&self, kind: ReportKind) -> &OwnedPort {
        match kind {
            ReportKind::Short => &self.short,
            ReportKind::Long => &self.long,
        }
    }

    fn ensure_alive(&self) -> Result<(), HidppError> {
        if self.is_disposed() {
            return Err(HidppError::Disposed);
        }

        Ok(())
    }

    fn map_port_error(&self, err: PortError) -> HidppError {
        if self.is_disposed() {
            HidppError::Disposed
        } else {
            HidppError::Port(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::testing::{self, FakeReceiver};

    fn battery_request() -> Frame {
        Frame::short(0x01, 0x03, 0x1, SW_ID, [0, 0, 0])
    }

    #[tokio::test]
    async fn returns_the_matching_reply_verbatim() {
        let receiver = FakeReceiver::new();
        let reply = Frame::long(0x01, 0x03, 0x1, SW_ID, &[0x64, 0x03, 0x05, 0x02]);
        receiver.respond_with(move |request| {
            if request.feature_index() == 0x03 {
                // Notifications and other devices' traffic come first.
                vec![
                    Frame::short(0x01, 0x03, 0x0, 0x0, [0x10, 0, 0]),
                    Frame::short(0x02, 0x03, 0x1, SW_ID, [0x20, 0, 0]),
                    reply,
                ]
            } else {
                Vec::new()
            }
        });
        let channel = testing::channel(&receiver, testing::fast_config());

        let got = channel
            .write_read(battery_request(), Duration::from_millis(500), MatchMode::Hidpp20)
            .await
            .unwrap();

        assert_eq!(got, Some(reply));
        assert_eq!(receiver.writes(), vec![battery_request()]);
    }

    #[tokio::test]
    async fn silent_devices_yield_nothing_and_release_the_permit() {
        let receiver = FakeReceiver::new();
        let channel = testing::channel(&receiver, testing::fast_config());

        for _ in 0..2 {
            let got = channel
                .write_read(battery_request(), Duration::from_millis(30), MatchMode::Hidpp20)
                .await
                .unwrap();
            assert_eq!(got, None);
        }

        // The second request was only written because the first released the permit.
        assert_eq!(receiver.writes().len(), 2);
        assert!(matches!(
            channel.send_v20(battery_request(), Duration::from_millis(10)).await,
            Err(HidppError::Timeout)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_request_is_in_flight() {
        let receiver = FakeReceiver::new();
        receiver.set_reply_delay(Duration::from_millis(20));
        receiver.respond_with(|request| vec![*request]);

        let mut config = testing::fast_config();
        config.permit_wait = Duration::from_secs(5);
        let channel = testing::channel(&receiver, config);
        let answered = Arc::new(AtomicUsize::new(0));

        let callers = (0..6u8).map(|i| {
            let channel = Arc::clone(&channel);
            let answered = Arc::clone(&answered);
            tokio::spawn(async move {
                let request = Frame::short(0x01, 0x03 + i, 0x1, SW_ID, [i, 0, 0]);
                let reply = channel
                    .write_read(request, Duration::from_secs(1), MatchMode::Hidpp20)
                    .await
                    .unwrap();
                if reply == Some(request) {
                    answered.fetch_add(1, Ordering::SeqCst);
                }
            })
        });
        for caller in callers.collect::<Vec<_>>() {
            caller.await.unwrap();
        }

        assert_eq!(answered.load(Ordering::SeqCst), 6);
        assert_eq!(receiver.writes().len(), 6);
        assert_eq!(receiver.max_outstanding_at_write(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_permit_fails_fast() {
        let receiver = FakeReceiver::new();
        let mut config = testing::fast_config();
        config.permit_wait = Duration::from_millis(20);
        let channel = testing::channel(&receiver, config);

        let slow = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move {
                channel
                    .write_read(battery_request(), Duration::from_millis(300), MatchMode::Hidpp20)
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = std::time::Instant::now();
        let other = Frame::short(0x02, 0x03, 0x1, SW_ID, [0, 0, 0]);
        let got = channel
            .write_read(other, Duration::from_millis(300), MatchMode::Hidpp20)
            .await
            .unwrap();

        assert_eq!(got, None);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(receiver.writes(), vec![battery_request()]);
        assert_eq!(slow.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn late_replies_to_abandoned_requests_are_not_consumed() {
        let receiver = FakeReceiver::new();
        let channel = testing::channel(&receiver, testing::fast_config());

        let abandoned = Frame::short(0x01, 0x03, 0x1, SW_ID, [0, 0, 0]);
        assert_eq!(
            channel
                .write_read(abandoned, Duration::from_millis(20), MatchMode::Hidpp20)
                .await
                .unwrap(),
            None
        );

        // The reply to the abandoned request shows up while the next one waits.
        let next = Frame::short(0x01, 0x05, 0x0, SW_ID, [0, 0, 0]);
        let next_reply = Frame::long(0x01, 0x05, 0x0, SW_ID, &[0x0c]);
        receiver.respond_with(move |request| {
            if request.feature_index() == 0x05 {
                vec![Frame::short(0x01, 0x03, 0x1, SW_ID, [0x55, 0, 0]), next_reply]
            } else {
                Vec::new()
            }
        });

        let got = channel
            .write_read(next, Duration::from_millis(500), MatchMode::Hidpp20)
            .await
            .unwrap();
        assert_eq!(got, Some(next_reply));
    }

    #[tokio::test]
    async fn stale_frames_are_drained_before_writing() {
        let receiver = FakeReceiver::new();
        let channel = testing::channel(&receiver, testing::fast_config());

        let stale = Frame::short(0x01, 0x03, 0x1, SW_ID, [0x11, 0, 0]);
        channel.deliver(stale);

        let got = channel
            .write_read(battery_request(), Duration::from_millis(30), MatchMode::Hidpp20)
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn pings_require_the_echoed_payload() {
        let receiver = FakeReceiver::new();
        receiver.respond_with(|request| vec![*request]);
        let channel = testing::channel(&receiver, testing::fast_config());
        assert!(channel.ping(0x01, Duration::from_millis(200), false).await.unwrap());

        receiver.respond_with(|request| {
            let mut params = [0u8; 3];
            params.copy_from_slice(&request.params()[..3]);
            params[2] = params[2].wrapping_add(1);
            vec![Frame::short(request.device_index(), 0x00, 0x1, SW_ID, params)]
        });
        assert!(!channel.ping(0x01, Duration::from_millis(200), false).await.unwrap());
    }

    #[tokio::test]
    async fn strict_pings_end_on_hidpp10_errors() {
        let receiver = FakeReceiver::new();
        receiver.respond_with(|request| {
            vec![Frame::short_v10(request.device_index(), 0x8f, [0x00, 0x1a, 0x08, 0x00])]
        });
        let channel = testing::channel(&receiver, testing::fast_config());

        let started = std::time::Instant::now();
        assert!(!channel.ping(0x04, Duration::from_secs(2), true).await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn register_errors_are_reported() {
        let receiver = FakeReceiver::new();
        receiver.respond_with(|request| {
            vec![Frame::short_v10(0xff, 0x8f, [request.sub_id(), 0x02, 0x03, 0x00])]
        });
        let channel = testing::channel(&receiver, testing::fast_config());

        assert!(matches!(
            channel.read_register(ReceiverRegister::Connections).await,
            Err(HidppError::Hidpp10(v10::ErrorType::InvalidValue))
        ));
    }

    #[tokio::test]
    async fn disposed_channels_fail_fast() {
        let receiver = FakeReceiver::new();
        let channel = testing::channel(&receiver, testing::fast_config());

        assert!(channel.dispose());
        assert!(!channel.dispose());
        assert!(matches!(
            channel
                .write_read(battery_request(), Duration::from_millis(10), MatchMode::Hidpp20)
                .await,
            Err(HidppError::Disposed)
        ));
        assert!(receiver.writes().is_empty());
        assert_eq!(receiver.close_count(ReportKind::Short), 1);
        assert_eq!(receiver.close_count(ReportKind::Long), 1);
    }
}
