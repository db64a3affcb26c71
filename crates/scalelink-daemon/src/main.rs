//! scalelink command line
//!
//! ```bash
//! # follow the scale, logging weight changes and status broadcasts
//! SERIAL_ADDRESS=/dev/ttyUSB0 scalelink run
//!
//! # one-shot device commands
//! scalelink --config scalelink.json tare
//! scalelink calibrate 500
//!
//! # inspect recorded events / available ports
//! scalelink events --min-weight 10 --since-hours 24
//! scalelink ports
//! ```

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use scalelink_core::prelude::*;
use scalelink_core::protocol::list_ports;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scalelink")]
#[command(about = "Serial bridge for JSON scale controllers", long_about = None)]
struct Cli {
    /// JSON config file; falls back to SERIAL_ADDRESS / SERIAL_BAUDRATE
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow readings and status messages until interrupted
    Run {
        /// Seconds between weight reports
        #[arg(long, default_value = "5")]
        report_every: u64,
    },

    /// Zero the scale
    Tare,

    /// Calibrate against a known reference weight
    Calibrate {
        /// Reference weight placed on the scale
        reference_weight: f64,
    },

    /// Print recorded weight events, most recent first
    Events {
        #[arg(long)]
        min_weight: Option<f64>,

        #[arg(long)]
        max_weight: Option<f64>,

        /// Only events from the last N hours
        #[arg(long)]
        since_hours: Option<i64>,
    },

    /// List serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => {
            print_ports();
            Ok(())
        }
        Commands::Events {
            min_weight,
            max_weight,
            since_hours,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let filter = EventFilter {
                min_weight,
                max_weight,
                start: since_hours.map(|h| Utc::now() - ChronoDuration::hours(h)),
                end: None,
            };
            print_events(&config, &filter)
        }
        Commands::Run { report_every } => {
            let config = load_config(cli.config.as_deref())?;
            run(&config, Duration::from_secs(report_every.max(1))).await
        }
        Commands::Tare => {
            let config = load_config(cli.config.as_deref())?;
            one_shot(&config, DeviceCommand::Tare).await
        }
        Commands::Calibrate { reference_weight } => {
            let config = load_config(cli.config.as_deref())?;
            one_shot(&config, DeviceCommand::Calibrate(reference_weight)).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BusConfig> {
    match path {
        Some(path) => BusConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => BusConfig::from_env().context("Failed to load config from environment"),
    }
}

fn open_store(config: &BusConfig) -> Result<Arc<SqliteEventStore>> {
    let store = SqliteEventStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open event store at {}",
            config.database_path.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn open_bus(config: &BusConfig) -> Result<ScaleBus> {
    let store = open_store(config)?;
    ScaleBus::open(config, store).map_err(|e| {
        let available: Vec<String> = list_ports().into_iter().map(|p| p.name).collect();
        warn!("available ports: {:?}", available);
        anyhow::Error::new(e).context(format!("Failed to open {}", config.port_name))
    })
}

async fn run(config: &BusConfig, report_every: Duration) -> Result<()> {
    let bus = open_bus(config)?;
    let mut ticker = tokio::time::interval(report_every);
    let mut last_status = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                for entry in bus.messages_since(last_status) {
                    info!("status #{}: {}", entry.id, serde_json::Value::Object(entry.value));
                    last_status = entry.id;
                }
                let snapshot = bus.scale_snapshot();
                info!(
                    "weight {:.2} (baseline {})",
                    snapshot.current_weight,
                    snapshot.baseline.map_or("unset".to_string(), |b| format!("{:.2}", b))
                );
                if bus.is_finished() {
                    error!("serial loops stopped");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn one_shot(config: &BusConfig, command: DeviceCommand) -> Result<()> {
    let bus = open_bus(config)?;
    let reply = match bus.send_command(command).await {
        Ok(reply) => reply,
        Err(e) => DeviceReply::from_error(&e),
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);
    if !reply.is_success() {
        anyhow::bail!("{} failed: {}", command, reply.status().unwrap_or("no status"));
    }
    Ok(())
}

fn print_events(config: &BusConfig, filter: &EventFilter) -> Result<()> {
    let store = open_store(config)?;
    let events = store.query(filter).context("Failed to query events")?;

    println!("timestamp,starting_weight,final_weight");
    for event in events {
        println!(
            "{},{},{}",
            event.timestamp.to_rfc3339(),
            event.starting_weight,
            event.final_weight
        );
    }
    Ok(())
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  [{:04x}:{:04x}] {}",
                port.name,
                vid,
                pid,
                port.product.unwrap_or_default()
            ),
            _ => println!("{}", port.name),
        }
    }
}
