//! Outbound TLS transport for the dialback relay
//!
//! This crate turns a connection key and the `--insecure` flag into a rustls
//! client configuration and performs single, time-bounded TLS dials against
//! the listener.
//!
//! # Trust policy
//!
//! | insecure | key   | mode                     |
//! |----------|-------|--------------------------|
//! | false    | none  | error: key required      |
//! | false    | given | [`TrustMode::Verified`]  |
//! | true     | none  | [`TrustMode::InsecureNoIdentity`] |
//! | true     | given | [`TrustMode::InsecureWithIdentity`] |
//!
//! # Example
//!
//! ```no_run
//! use dialback_transport::{build_client_tls_config, Dialer, RelayTarget, TlsDialer};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tls = build_client_tls_config("<connection key>", false)?;
//! let dialer = TlsDialer::new(&tls, Duration::from_secs(5));
//! let target: RelayTarget = "listener.example.com".parse()?;
//! let established = dialer.dial(&target).await?;
//! println!("connected to {}", established.remote_addr);
//! # Ok(())
//! # }
//! ```

// Initialize rustls crypto provider once globally
static CRYPTO_PROVIDER_INIT: std::sync::Once = std::sync::Once::new();

pub(crate) fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            // Provider already installed by another crate, this is fine
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

pub mod dialer;
pub mod target;
pub mod tls;
mod verifier;

pub use dialer::{DialError, Dialer, Established, TlsDialer};
pub use target::{RelayTarget, TargetError, DEFAULT_LISTEN_PORT};
pub use tls::{
    build_client_tls_config, build_server_tls_config, ClientTlsConfig, TlsConfigError, TrustMode,
};
