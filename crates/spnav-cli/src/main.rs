//! spnav command-line client
//!
//! Small consumer of the spacenav daemon. Provides:
//! - `events`: stream decoded events from the daemon
//! - `devices`: list 6-DoF devices visible to this machine
//! - `status`: check whether a daemon is accepting connections

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use spnav_device::{BackendOptions, DeviceDescriptor, is_known_device, select_backend};
use spnav_proto::{SpnavClient, socket_path};
use spnav_types::DeviceEvent;

/// spnav - spacenav daemon client
#[derive(Parser)]
#[command(name = "spnav")]
#[command(about = "Inspect 6-DoF devices and the spacenav daemon")]
#[command(version)]
#[command(after_help = "\
Examples:
  spnav events                     Print events until interrupted
  spnav events --json --count 10   Print ten events as JSON lines
  spnav events --sensitivity 0.5   Halve motion values for this client
  spnav devices                    List known space mice
  spnav devices --all --json       List every input device as JSON
  spnav status                     Check daemon status
")]
struct Cli {
    /// Daemon socket (defaults to `$SPNAV_SOCKET` or `/var/run/spnav.sock`)
    #[arg(long, global = true, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream events from the daemon
    Events {
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,

        /// Request a motion scale factor before streaming
        #[arg(long, value_name = "S")]
        sensitivity: Option<f32>,

        /// Stop after this many events
        #[arg(long, value_name = "N")]
        count: Option<usize>,
    },

    /// List devices visible to the local backend
    Devices {
        /// Include devices that are not known space mice
        #[arg(long)]
        all: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show daemon status
    Status,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spnav={default_level}")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn target_socket(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(socket_path)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let socket = target_socket(cli.socket_path);

    match cli.command {
        Commands::Events {
            json,
            sensitivity,
            count,
        } => run_events(&socket, json, sensitivity, count).await,
        Commands::Devices { all, json } => run_devices(all, json),
        Commands::Status => {
            run_status(&socket).await;
            Ok(())
        }
    }
}

fn format_event(event: &DeviceEvent, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(event)?)
    } else {
        Ok(event.to_string())
    }
}

async fn run_events(
    socket: &Path,
    json: bool,
    sensitivity: Option<f32>,
    count: Option<usize>,
) -> Result<()> {
    let mut client = SpnavClient::connect_to(socket)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", socket.display()))?;

    if let Some(value) = sensitivity {
        if !(value.is_finite() && value > 0.0) {
            bail!("Sensitivity must be a positive number, got {value}");
        }
        client
            .set_sensitivity(value)
            .await
            .context("Failed to send sensitivity")?;
    }

    let mut printed = 0usize;
    while count.is_none_or(|limit| printed < limit) {
        let frame = tokio::select! {
            frame = client.next_frame() => frame.context("Failed to read from daemon")?,
            _ = tokio::signal::ctrl_c() => break,
        };

        let Some(frame) = frame else {
            eprintln!("Daemon closed the connection");
            break;
        };

        match frame.to_event() {
            Ok(event) => {
                println!("{}", format_event(&event, json)?);
                printed += 1;
            }
            Err(e) => warn!("Skipping frame {:?}: {}", frame.words(), e),
        }
    }

    Ok(())
}

fn list_devices(all: bool) -> Result<Vec<DeviceDescriptor>> {
    let backend = select_backend(BackendOptions {
        grab: false,
        ..BackendOptions::default()
    });

    let known: &dyn Fn(&DeviceDescriptor) -> bool = &is_known_device;
    let filter = (!all).then_some(known);
    backend
        .find_devices(filter)
        .with_context(|| format!("Device discovery failed ({} backend)", backend.name()))
}

fn run_devices(all: bool, json: bool) -> Result<()> {
    let devices = list_devices(all)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    for device in &devices {
        println!("{device}");
        for path in device.paths.iter().skip(1) {
            println!("    also {}", path.display());
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum DaemonStatus {
    NotRunning,
    Running,
    Unreachable(String),
}

async fn probe(socket: &Path) -> DaemonStatus {
    if !socket.exists() {
        return DaemonStatus::NotRunning;
    }
    match SpnavClient::connect_to(socket).await {
        Ok(_) => DaemonStatus::Running,
        Err(e) => DaemonStatus::Unreachable(e.to_string()),
    }
}

async fn run_status(socket: &Path) {
    match probe(socket).await {
        DaemonStatus::NotRunning => {
            println!("Status: Not running");
            println!("Socket: {} (not found)", socket.display());
        }
        DaemonStatus::Running => {
            println!("Status: Running");
            println!("Socket: {}", socket.display());
        }
        DaemonStatus::Unreachable(error) => {
            println!("Status: Error");
            println!(
                "Socket: {} (exists but connection failed)",
                socket.display()
            );
            println!("Error: {error}");
        }
    }
}
