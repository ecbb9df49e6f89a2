use std::{
    io::{BufWriter, Write},
    time::Duration,
};

use anyhow::Result;
use clap::Args;
use lgstray_hidpp::{
    bus::DeviceBus,
    device::{DeviceIdentity, SessionState},
    feature::{
        battery::{BatteryStatus, PowerSupplyStatus},
        registry,
    },
};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use super::Cli;
use crate::config::Settings;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Detect the devices paired to the receiver and read their battery once.
#[derive(Args)]
pub struct ProbeCommand {}

impl ProbeCommand {
    pub async fn execute(&self, root: &Cli, settings: &Settings) -> Result<()> {
        let bus = super::start_bus(settings).await?;
        wait_for_sessions(&bus).await;
        let devices = probe_devices(&bus).await;
        bus.dispose();

        let mut stdout = BufWriter::new(anstream::stdout());

        if root.json {
            writeln!(stdout, "{}", json!(devices))?;
            stdout.flush()?;
            return Ok(());
        }

        writeln!(stdout, "{}", "Receiver".bold())?;
        writeln!(stdout, " │")?;

        if devices.is_empty() {
            writeln!(stdout, " ╰─ {}", "No devices were found.".bright_black().italic())?;
            stdout.flush()?;
            return Ok(());
        }

        let devices_len = devices.len();
        for (device_i, device) in devices.into_iter().enumerate() {
            let last = device_i == devices_len - 1;
            if device_i != 0 {
                writeln!(stdout, " │")?;
            }

            let initialized = device.state == SessionState::Initialized;
            writeln!(
                stdout,
                "{} {}: {} {}",
                if last { " ╰─" } else { " ├─" },
                device.device_index.bright_blue(),
                if initialized {
                    "●".green().into_styled()
                } else {
                    "●".red().into_styled()
                },
                match &device.identity {
                    Some(identity) => identity.name.clone(),
                    None => format!("{:?}", device.state).bright_black().italic().to_string(),
                },
            )?;

            let mut properties = Vec::new();
            if let Some(identity) = &device.identity {
                properties.push(format!("TYPE: {:?}", identity.device_type.bright_black()));
                properties.push(format!("ID: {}", identity.identifier.bright_black()));
            }
            if let Some(feature) = device.battery_feature {
                properties.push(format!("BATTERY FEATURE: {}", feature.bright_black()));
            }
            if let Some(battery) = device.battery {
                properties.push(format_battery(&battery));
            }

            let properties_len = properties.len();
            for (property_i, property) in properties.into_iter().enumerate() {
                writeln!(
                    stdout,
                    "{}{} {}",
                    if last { "         " } else { " │       " },
                    if property_i == properties_len - 1 { "╰─" } else { "├─" },
                    property
                )?;
            }
        }

        stdout.flush()?;

        Ok(())
    }
}

fn format_battery(battery: &BatteryStatus) -> String {
    let percentage = format!("{}%", battery.percentage);
    let percentage = match battery.percentage {
        50..=100 => percentage.green().into_styled(),
        20..=49 => percentage.yellow().into_styled(),
        _ => percentage.bright_red().into_styled(),
    };

    let mut text = format!(
        "BATTERY: {}, {}",
        percentage,
        match battery.status {
            PowerSupplyStatus::Charging | PowerSupplyStatus::Full => {
                format!("{:?}", battery.status).blue().to_string()
            },
            status => format!("{status:?}").bright_black().to_string(),
        }
    );
    if let Some(millivolts) = battery.millivolts {
        text.push_str(&format!(" ({})", format!("{millivolts} mV").bright_black()));
    }

    text
}

/// Waits until every announced device finished or gave up initializing.
async fn wait_for_sessions(bus: &DeviceBus) {
    let settled = async {
        while bus.sessions().iter().any(|session| {
            !matches!(session.state(), SessionState::Initialized | SessionState::FailedInit)
        }) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    if tokio::time::timeout(SETTLE_TIMEOUT, settled).await.is_err() {
        warn!("some devices did not finish initializing in time");
    }
}

async fn probe_devices(bus: &DeviceBus) -> Vec<ProbedDevice> {
    let mut devices = Vec::new();

    for session in bus.sessions() {
        let battery = session.poll_battery().await;

        devices.push(ProbedDevice {
            device_index: session.device_index(),
            state: session.state(),
            identity: session.identity(),
            battery_feature: session.battery_feature_id().map(registry::name),
            battery,
        });
    }

    devices
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
struct ProbedDevice {
    device_index: u8,
    state: SessionState,

    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<DeviceIdentity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    battery_feature: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    battery: Option<BatteryStatus>,
}
