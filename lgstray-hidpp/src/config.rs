//! Tunable timings and limits of the HID++ bus.

use std::time::Duration;

/// Configures the deadlines, retry counts and back-offs used by the bus and
/// its device sessions.
///
/// HID++ has no negative acknowledgement: a device that cannot answer simply
/// stays silent. Every wait in this crate is therefore bounded by one of these
/// values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// The slice a read pump blocks in a single read before checking whether
    /// it should stop.
    pub read_slice: Duration,

    /// How long a request waits for the exclusive request permit before
    /// giving up.
    pub permit_wait: Duration,

    /// The default reply deadline of a request, used for battery polls.
    pub request_timeout: Duration,

    /// The reply deadline of receiver register accesses during setup.
    pub setup_timeout: Duration,

    /// The reply deadline of feature discovery and identity requests.
    pub feature_timeout: Duration,

    /// The reply deadline of a single responsiveness ping.
    pub ping_timeout: Duration,

    /// The reply deadline of pings sent during manual enumeration.
    pub enumeration_ping_timeout: Duration,

    /// How long a freshly announced device is given to power up before its
    /// session is initialized.
    pub arrival_settle: Duration,

    /// How long setup waits for announcements after forcing them.
    pub announce_settle: Duration,

    /// Pings sent before a device is considered unresponsive.
    pub ping_attempts: u32,

    /// Pause between two pings.
    pub ping_backoff: Duration,

    /// Full initialization attempts of a session.
    pub init_attempts: u32,

    /// Pause between two initialization attempts.
    pub init_backoff: Duration,

    /// Empty replies tolerated while reading a device name.
    pub name_chunk_retries: u32,

    /// Pause after an empty device name chunk.
    pub name_chunk_backoff: Duration,

    /// The highest device index probed by manual enumeration.
    pub max_device_index: u8,

    /// Capacity of the queue between the read pumps and the correlator.
    pub inbound_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            read_slice: Duration::from_millis(100),
            permit_wait: Duration::from_millis(100),
            request_timeout: Duration::from_millis(100),
            setup_timeout: Duration::from_millis(2000),
            feature_timeout: Duration::from_millis(1000),
            ping_timeout: Duration::from_millis(200),
            enumeration_ping_timeout: Duration::from_millis(500),
            arrival_settle: Duration::from_millis(1000),
            announce_settle: Duration::from_millis(1000),
            ping_attempts: 3,
            ping_backoff: Duration::from_millis(100),
            init_attempts: 3,
            init_backoff: Duration::from_millis(500),
            name_chunk_retries: 3,
            name_chunk_backoff: Duration::from_millis(50),
            max_device_index: 6,
            inbound_capacity: 5,
        }
    }
}
