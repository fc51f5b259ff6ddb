//! usbwatch - list attached USB devices and watch them come and go.
//!
//! `list` runs the platform enumeration command once. `monitor` runs the
//! device monitor on a blocking thread and prints its events until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use usbwatch_core::{Collector, DeviceEvent, DeviceEventKind, DeviceRecord, Platform};
use usbwatch_monitor::{DeviceMonitor, MonitorError};

mod config;
mod logging;
mod signals;

use config::Config;

/// Capacity of the monitor-to-printer event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "usbwatch")]
#[command(author, version, about = "List USB devices and watch for hot-plug events")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the USB devices attached right now
    List {
        /// Print a JSON array instead of one line per device
        #[arg(long)]
        json: bool,
    },
    /// Print connect and disconnect events until interrupted
    Monitor {
        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init_logging(&config.logging, cli.log_level.as_deref())
        .context("Failed to set up logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), platform = %Platform::detect(), "usbwatch starting");

    match cli.command {
        Command::List { json } => list_devices(&config, json).await,
        Command::Monitor { json } => monitor_devices(&config, json).await,
    }
}

async fn list_devices(config: &Config, json: bool) -> Result<()> {
    let collector = Collector::new(config.collector.clone());
    if !collector.platform().is_supported() {
        warn!(platform = %collector.platform(), "USB listing is not supported on this platform");
    }

    let devices = tokio::task::spawn_blocking(move || collector.list_devices())
        .await
        .context("Listing task failed")?
        .context("Failed to list USB devices")?;
    debug!(count = devices.len(), "USB devices listed");

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        for device in &devices {
            println!("{}", device_line(device));
        }
    }
    Ok(())
}

async fn monitor_devices(config: &Config, json: bool) -> Result<()> {
    let monitor = Arc::new(DeviceMonitor::new(
        config.monitor.to_monitor_config(),
        config.collector.clone(),
    ));

    let (event_tx, mut event_rx) = mpsc::channel::<DeviceEvent>(EVENT_CHANNEL_CAPACITY);
    let handler = move |event: &DeviceEvent| {
        if let Err(e) = event_tx.try_send(event.clone()) {
            warn!(error = %e, "Dropping USB event");
        }
    };

    // On macOS start() services notifications until stop(), so it always
    // gets a blocking thread of its own.
    let runner = Arc::clone(&monitor);
    let mut start_task = tokio::task::spawn_blocking(move || runner.start(handler));
    let mut start_finished = false;

    let mut shutdown_rx = signals::setup_signal_handlers();
    info!(platform = %monitor.platform(), "Watching for USB devices (Ctrl+C to stop)");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => print_event(&event, json)?,

            result = &mut start_task, if !start_finished => {
                start_finished = true;
                result
                    .context("Monitor task failed")?
                    .context("Failed to start USB monitor")?;
                if !monitor.is_running() {
                    info!("USB monitor exited");
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // shutdown() also turns away a start() that has not run yet.
    let stopper = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || stopper.shutdown())
        .await
        .context("Stopping monitor failed")?;
    if !start_finished {
        match start_task.await.context("Monitor task failed")? {
            Ok(()) | Err(MonitorError::ShutDown) => {}
            Err(e) => return Err(e).context("USB monitor failed"),
        }
    }

    // Flush whatever was delivered before the monitor stopped.
    while let Ok(event) = event_rx.try_recv() {
        print_event(&event, json)?;
    }

    info!("usbwatch stopped");
    Ok(())
}

fn device_line(device: &DeviceRecord) -> String {
    match device.device_id() {
        Some(device_id) => format!("{device} ({device_id})"),
        None => device.to_string(),
    }
}

fn print_event(event: &DeviceEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event).context("Failed to encode event")?);
        return Ok(());
    }

    match (event.kind, &event.device) {
        (DeviceEventKind::Connected | DeviceEventKind::Disconnected, Some(device)) => {
            println!("{:<12} {}", event.kind, device_line(device));
        }
        (kind, _) => {
            println!("{:<12} {}", kind, event.message.as_deref().unwrap_or("no details"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["usbwatch", "monitor", "--json", "--log-level", "debug"])
            .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Monitor { json: true }));
    }

    #[test]
    fn test_device_line_includes_location_when_known() {
        let device = DeviceRecord::new("Widget", "04d2", "0005")
            .unwrap()
            .with_device_id(Some("1-1.2".to_string()));

        assert!(device_line(&device).ends_with("(1-1.2)"));
    }
}
