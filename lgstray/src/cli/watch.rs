use std::{
    io::{BufWriter, Write},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Args;
use itertools::Itertools;
use lgstray_hidpp::{
    event::{DeviceInitMessage, DeviceMessage},
    feature::battery::PowerSupplyStatus,
    poller::BatteryPoller,
};
use owo_colors::OwoColorize;
use serde_json::json;
use tracing::info;

use super::Cli;
use crate::{
    collection::{DeviceCollection, DeviceEntry},
    config::Settings,
};

/// Keep polling the battery of all devices and print every change.
#[derive(Args)]
pub struct WatchCommand {
    /// Seconds between two battery polls, overriding the config file
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,
}

impl WatchCommand {
    pub async fn execute(&self, root: &Cli, settings: &Settings) -> Result<()> {
        let interval = self
            .interval
            .map_or_else(|| settings.poll_interval(), |secs| Duration::from_secs(secs.max(1)));

        let bus = super::start_bus(settings).await?;
        let messages = bus.subscribe();
        let poller = BatteryPoller::spawn(Arc::clone(&bus), interval)
            .context("could not start polling")?;

        let mut collection = DeviceCollection::new();
        let mut stdout = BufWriter::new(anstream::stdout());

        // Devices initialized during setup announced themselves before the
        // subscription existed.
        for session in bus.sessions() {
            if let Some(identity) = session.identity().filter(|_| session.is_initialized()) {
                collection.apply(&DeviceMessage::Init(DeviceInitMessage {
                    device_id: identity.identifier,
                    device_name: identity.name,
                    has_battery: session.has_battery(),
                    device_type: identity.device_type,
                }));
            }
        }
        for entry in collection.iter().sorted_by(|a, b| a.device_name.cmp(&b.device_name)) {
            print_entry(&mut stdout, root.json, "known", entry)?;
        }
        stdout.flush()?;

        loop {
            tokio::select! {
                message = messages.recv_async() => {
                    let Ok(message) = message else {
                        break;
                    };

                    let kind = match &message {
                        DeviceMessage::Init(_) => "init",
                        DeviceMessage::Update(_) => "update",
                    };
                    if let Some(entry) = collection.apply(&message) {
                        print_entry(&mut stdout, root.json, kind, entry)?;
                        stdout.flush()?;
                    }
                },
                result = tokio::signal::ctrl_c() => {
                    result.context("could not listen for Ctrl-C")?;
                    info!("stopping");
                    break;
                },
            }
        }

        poller.stop().await;
        bus.dispose();
        collection.clear();

        Ok(())
    }
}

fn print_entry(out: &mut impl Write, json: bool, kind: &str, entry: &DeviceEntry) -> Result<()> {
    if json {
        writeln!(out, "{}", json!({ "kind": kind, "device": entry }))?;
        return Ok(());
    }

    let time = entry
        .last_update
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".into());

    let battery = match entry.battery_percentage {
        Some(percentage) if entry.has_battery => {
            let text = format!("{percentage:>3}%");
            match entry.power_status {
                PowerSupplyStatus::Charging => format!("{} {}", text.blue(), "charging".blue()),
                PowerSupplyStatus::Full => format!("{} {}", text.green(), "full".green()),
                _ if percentage < 20 => text.bright_red().to_string(),
                _ => text.green().to_string(),
            }
        },
        _ if entry.has_battery => "   ?".bright_black().to_string(),
        _ => "no battery".bright_black().italic().to_string(),
    };

    writeln!(
        out,
        "{} {} {} ({:?}) {}",
        time.bright_black(),
        entry.device_id.bright_black(),
        entry.device_name,
        entry.device_type.bright_black(),
        battery,
    )?;

    Ok(())
}
