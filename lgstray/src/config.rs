//! The optional TOML configuration file.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use lgstray_hidpp::{
    config::BusConfig,
    interface::{DEFAULT_PRODUCT_IDS, DEFAULT_VENDOR_ID},
};
use serde::{Deserialize, Serialize};

/// Settings read from the configuration file.
///
/// Every key is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The vendor ID of the receiver.
    pub vendor_id: u16,

    /// The product IDs of the receivers to look for, in order of preference.
    pub product_ids: Vec<u16>,

    /// Seconds between two battery polls in `watch`.
    pub poll_interval_secs: u64,

    pub timing: TimingOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_ids: DEFAULT_PRODUCT_IDS.to_vec(),
            poll_interval_secs: 5,
            timing: TimingOverrides::default(),
        }
    }
}

/// Overrides of the bus timings, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingOverrides {
    pub request_timeout_ms: Option<u64>,
    pub setup_timeout_ms: Option<u64>,
    pub feature_timeout_ms: Option<u64>,
    pub ping_timeout_ms: Option<u64>,
    pub arrival_settle_ms: Option<u64>,
    pub announce_settle_ms: Option<u64>,
    pub init_attempts: Option<u32>,
}

impl Settings {
    /// Loads the settings from `path`, or returns the defaults if no path is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Builds the bus configuration, starting from the defaults.
    pub fn bus_config(&self) -> BusConfig {
        let mut config = BusConfig::default();
        let timing = &self.timing;

        let overrides = [
            (timing.request_timeout_ms, &mut config.request_timeout),
            (timing.setup_timeout_ms, &mut config.setup_timeout),
            (timing.feature_timeout_ms, &mut config.feature_timeout),
            (timing.ping_timeout_ms, &mut config.ping_timeout),
            (timing.arrival_settle_ms, &mut config.arrival_settle),
            (timing.announce_settle_ms, &mut config.announce_settle),
        ];
        for (millis, field) in overrides {
            if let Some(millis) = millis {
                *field = Duration::from_millis(millis);
            }
        }

        if let Some(attempts) = timing.init_attempts {
            config.init_attempts = attempts;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_path_yields_defaults() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bus_config(), BusConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
product_ids = [0xc539]
poll_interval_secs = 30

[timing]
request_timeout_ms = 250
init_attempts = 5
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        let config = settings.bus_config();

        assert_eq!(settings.vendor_id, DEFAULT_VENDOR_ID);
        assert_eq!(settings.product_ids, [0xc539]);
        assert_eq!(settings.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.init_attempts, 5);
        assert_eq!(config.setup_timeout, BusConfig::default().setup_timeout);
    }

    #[test]
    fn unreadable_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let err = Settings::load(Some(&path)).unwrap_err();

        assert!(err.to_string().contains("could not read config file"));
    }

    #[test]
    fn malformed_files_are_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vendor_id = \"logitech\"").unwrap();

        assert!(Settings::load(Some(file.path())).is_err());
    }
}
