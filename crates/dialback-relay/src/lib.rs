//! Reverse-connect relay loop
//!
//! The relay dials out to a listener, authenticates with mutual TLS derived
//! from the connection key, and serves SOCKS5 over a yamux session carried on
//! that connection:
//!
//! ```text
//! RelayLoop ──dial──▶ TlsDialer ──TLS stream──▶ TransportBridge
//!     ▲                                             │
//!     └──── sleep(reconnect_after) ◀── error/end ───┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dialback_relay::{run_relay, RelayConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_address("listener.example.com")?
//!     .with_connection_key("<connection key>")
//!     .with_reconnect_after(Duration::from_secs(10));
//!
//! run_relay(config).await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod relay;

pub use bridge::{SessionServer, TransportBridge};
pub use config::{RelayConfig, DEFAULT_DIAL_TIMEOUT};
pub use error::{RelayError, RelayResult, ServeError};
pub use relay::{run_relay, RelayEvent, RelayLoop, RelayState};
