//! dialback - reverse-connect SOCKS5 relay
//!
//! Dials out to a dialback listener, authenticates with the shared connection
//! key and serves SOCKS5 to the listener over the outbound connection.

use anyhow::{Context, Result};
use clap::Parser;
use dialback_relay::{RelayConfig, RelayLoop, TransportBridge};
use dialback_transport::{RelayTarget, TlsDialer};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the connection key
const CONNECTION_KEY_ENV: &str = "DIALBACK_KEY";

/// Connect back to a dialback listener and relay its SOCKS5 traffic
#[derive(Parser, Debug)]
#[command(name = "dialback")]
#[command(override_usage = "dialback <CONNECT BACK ADDRESS> --key <CONNECTION KEY>")]
#[command(version)]
#[command(long_version = concat!(env!("DIALBACK_VERSION"), "\nCommit: ", env!("DIALBACK_COMMIT")))]
#[command(long_about = r#"
Connects back to a dialback listener and serves SOCKS5 over the outbound
connection, so the listener can reach the network this host is in.

EXAMPLES:
  # Connect to a listener on the default port (4080)
  dialback listener.example.com --key $KEY

  # Keep reconnecting every 10 seconds
  dialback listener.example.com:9443 --reconnect-after 10s

ENVIRONMENT VARIABLES:
  DIALBACK_KEY    Connection key displayed by the listener
"#)]
struct Cli {
    /// Listener address (host[:port], port defaults to 4080)
    #[arg(value_name = "CONNECT BACK ADDRESS")]
    address: String,

    /// Connect back timeout
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Reconnect after the given duration (0s disables reconnecting)
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    reconnect_after: Duration,

    /// Connection key that is displayed when starting a listener
    #[arg(
        short = 'k',
        long,
        env = CONNECTION_KEY_ENV,
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    key: String,

    /// Don't check the listener certificate; only send a client certificate
    /// when a connection key is given
    #[arg(long)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn relay_config(&self) -> Result<RelayConfig> {
        let target: RelayTarget = self
            .address
            .parse()
            .with_context(|| format!("Invalid connect back address '{}'", self.address))?;

        Ok(RelayConfig::new(target)
            .with_connection_key(self.key.clone())
            .with_timeout(self.timeout)
            .with_reconnect_after(self.reconnect_after)
            .with_insecure(self.insecure))
    }
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;

    let config = cli.relay_config()?;
    info!("Relaying for {}", config.target);
    if config.insecure {
        warn!("⚠️  Listener certificate verification disabled (insecure mode)");
    }

    let mut relay = RelayLoop::from_config(config).context("Failed to start relay")?;
    run_until_interrupted(&mut relay).await
}

/// Drive the relay until it stops or Ctrl+C is pressed
///
/// A relay error is returned, not logged; anyhow reports it on exit.
async fn run_until_interrupted(relay: &mut RelayLoop<TlsDialer, TransportBridge>) -> Result<()> {
    // Ctrl+C drops the loop, which closes any active session
    tokio::select! {
        result = relay.run() => {
            result?;
            info!("Relay finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
