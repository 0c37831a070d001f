//! spacenav daemon entry point.
//!
//! Opens the configured 6-DoF devices and serves their events to local
//! clients over a UNIX socket until SIGINT or SIGTERM.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use spnav_device::select_backend;
use spnavd::{Config, Daemon, default_config_path, shutdown_signal};

/// spnavd - user-space driver for 6-DoF space mice
#[derive(Parser, Debug)]
#[command(name = "spnavd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Custom socket path (defaults to `$SPNAV_SOCKET` or `/var/run/spnav.sock`)
    #[arg(long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Config file (defaults to `~/.config/spnavd/config.json`)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to a timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging(verbose: bool) {
    let default_level = if verbose || cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spnav={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("spnavd-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        let symlink_path = temp_dir.join("spnavd.log");
        let _ = std::fs::remove_file(&symlink_path);
        let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    let Some(path) = explicit.or_else(default_config_path) else {
        return Ok(Config::default());
    };
    Config::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose);

    info!("Starting spnavd {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config)?;
    let backend = select_backend(config.backend_options());

    let mut daemon = Daemon::from_config(&config, args.socket_path, backend)
        .await
        .context("Failed to start daemon")?;
    daemon.run(shutdown_signal()).await?;
    drop(daemon);

    info!("spnavd stopped");
    Ok(())
}
