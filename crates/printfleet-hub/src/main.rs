//! PrintFleet hub entry point.
//!
//! Loads the TOML configuration, builds a [`Fleet`], connects every printer
//! listed under `[[printers]]` and prints the hub's events to stdout as JSON
//! lines (`{"event": "...", "payload": {...}}`) until Ctrl+C.
//!
//! Live printer clients are supplied by the application that embeds the hub
//! library. Standalone, the binary drives simulated printers, so `--simulate`
//! is required.
//!
//! # Usage
//!
//! ```text
//! printfleet-hub [OPTIONS]
//!
//! Options:
//!   --config <PATH>       Configuration file [default: printfleet.toml]
//!   --log-level <LEVEL>   Log filter; overrides [hub].log_level
//!   --simulate            Drive simulated printers
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable             | Description                                  |
//! |----------------------|----------------------------------------------|
//! | `PRINTFLEET_CONFIG`  | Same as `--config`                           |
//! | `PRINTFLEET_LOG`     | Same as `--log-level`                        |
//! | `RUST_LOG`           | Full tracing filter; wins over both of these |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use printfleet_hub::application::event_bus::EventFilter;
use printfleet_hub::application::fleet::Fleet;
use printfleet_hub::infrastructure::protocol::simulated::SimulatedClientFactory;
use printfleet_hub::infrastructure::storage::config::{load_config, AppConfig};
use printfleet_hub::infrastructure::storage::overrides::ConfigOverrideSource;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-printer session and polling hub.
#[derive(Debug, Parser)]
#[command(
    name = "printfleet-hub",
    about = "Multi-printer session, backend and polling coordination hub",
    version
)]
struct Cli {
    /// Path to the TOML configuration file. A missing file means defaults.
    #[arg(long, default_value = "printfleet.toml", env = "PRINTFLEET_CONFIG")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `printfleet_hub=trace`.
    #[arg(long, env = "PRINTFLEET_LOG")]
    log_level: Option<String>,

    /// Drive simulated printers instead of real hardware.
    #[arg(long)]
    simulate: bool,
}

impl Cli {
    /// `--log-level` when given, otherwise the configured level.
    fn effective_log_level(&self, config: &AppConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.hub.log_level.clone())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // Logs go to stderr; stdout carries the event stream.
    let level = cli.effective_log_level(&config);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if !cli.simulate {
        anyhow::bail!(
            "no live printer clients are linked into this binary; run with --simulate"
        );
    }

    let settings = config.fleet_settings()?;
    let overrides = Arc::new(ConfigOverrideSource::from_config(&config));
    let clients = Arc::new(SimulatedClientFactory::new());
    let fleet = Fleet::new(settings, clients, overrides);

    let mut events = fleet.subscribe(EventFilter::All);
    fleet.start();

    info!(
        "PrintFleet hub starting with {} configured printer(s)",
        config.printers.len()
    );
    for printer in &config.printers {
        let session = fleet.connect(printer.connection_parameters());
        info!("{} -> {}", printer.name, session.id);
    }

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_ctrl_c.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("could not serialise {} event: {e}", event.name()),
                },
                None => break,
            },
        }
    }

    fleet.shutdown().await;
    info!("PrintFleet hub stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["printfleet-hub"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("printfleet.toml"));
        assert!(!cli.simulate);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "printfleet-hub",
            "--config",
            "/etc/printfleet/hub.toml",
            "--log-level",
            "debug",
            "--simulate",
        ]);

        assert_eq!(cli.config, PathBuf::from("/etc/printfleet/hub.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.simulate);
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        // Arrange
        let mut config = AppConfig::default();
        config.hub.log_level = "warn".to_string();
        let without_flag = Cli::parse_from(["printfleet-hub"]);
        let with_flag = Cli::parse_from(["printfleet-hub", "--log-level", "trace"]);

        // Assert
        assert_eq!(without_flag.effective_log_level(&config), "warn");
        assert_eq!(with_flag.effective_log_level(&config), "trace");
    }
}
