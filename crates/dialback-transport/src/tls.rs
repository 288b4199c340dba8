//! Trust policy and TLS configuration
//!
//! Policy selection ([`TrustMode::select`]) is kept separate from building the
//! rustls configuration ([`ClientTlsConfig::for_mode`]).

use crate::ensure_crypto_provider;
use crate::verifier::SkipServerVerification;
use dialback_cert::{parse_connection_key, IdentityMaterial, KeyParseError};
use rustls::pki_types::ServerName;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum TlsConfigError {
    #[error("connection key is required")]
    KeyRequired,

    #[error("parse connection key: {0}")]
    Key(#[from] KeyParseError),

    #[error("configure TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid server name '{0}'")]
    InvalidServerName(String),

    #[error("client certificate verifier: {0}")]
    Verifier(String),
}

/// Resolved combination of server verification and client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode {
    /// Verify the listener against the key's authority and present the key's identity
    Verified,
    /// Skip server verification and present no identity
    InsecureNoIdentity,
    /// Skip server verification but still present the key's identity
    InsecureWithIdentity,
}

impl TrustMode {
    /// Pick the trust mode for the given flags
    pub fn select(insecure: bool, key_present: bool) -> Result<Self, TlsConfigError> {
        match (insecure, key_present) {
            (false, false) => Err(TlsConfigError::KeyRequired),
            (false, true) => Ok(Self::Verified),
            (true, false) => Ok(Self::InsecureNoIdentity),
            (true, true) => Ok(Self::InsecureWithIdentity),
        }
    }

    pub fn verifies_server(self) -> bool {
        matches!(self, Self::Verified)
    }

    pub fn requires_identity(self) -> bool {
        !matches!(self, Self::InsecureNoIdentity)
    }
}

/// Client-side TLS settings used for every dial
#[derive(Debug, Clone)]
pub struct ClientTlsConfig {
    trust_mode: TrustMode,
    config: Arc<ClientConfig>,
    server_name: Option<ServerName<'static>>,
}

impl ClientTlsConfig {
    /// Build the rustls configuration for a trust mode
    pub fn for_mode(
        trust_mode: TrustMode,
        identity: Option<IdentityMaterial>,
    ) -> Result<Self, TlsConfigError> {
        ensure_crypto_provider();

        let (config, server_name) = match (trust_mode, identity) {
            (TrustMode::Verified, Some(identity)) => {
                let mut roots = RootCertStore::empty();
                roots.add(identity.trust_anchor)?;

                let server_name = ServerName::try_from(identity.server_name.clone())
                    .map_err(|_| TlsConfigError::InvalidServerName(identity.server_name))?;

                let config = ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_client_auth_cert(identity.cert_chain, identity.private_key)?;

                (config, Some(server_name))
            }
            (TrustMode::InsecureNoIdentity, _) => {
                let config = ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(SkipServerVerification::new())
                    .with_no_client_auth();

                (config, None)
            }
            (TrustMode::InsecureWithIdentity, Some(identity)) => {
                // Expected server name is cleared: SNI falls back to the dialed host
                let config = ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(SkipServerVerification::new())
                    .with_client_auth_cert(identity.cert_chain, identity.private_key)?;

                (config, None)
            }
            (_, None) => return Err(TlsConfigError::KeyRequired),
        };

        Ok(Self {
            trust_mode,
            config: Arc::new(config),
            server_name,
        })
    }

    pub fn trust_mode(&self) -> TrustMode {
        self.trust_mode
    }

    pub fn verifies_server(&self) -> bool {
        self.trust_mode.verifies_server()
    }

    /// Whether a client certificate is offered during the handshake
    pub fn presents_client_identity(&self) -> bool {
        self.config.client_auth_cert_resolver.has_certs()
    }

    /// Server name to verify and send as SNI instead of the dialed host
    pub fn server_name_override(&self) -> Option<&ServerName<'static>> {
        self.server_name.as_ref()
    }

    pub fn rustls_config(&self) -> Arc<ClientConfig> {
        self.config.clone()
    }
}

/// Build the relay's client TLS configuration from the connection key and `insecure` flag
///
/// An empty `connection_key` means no key was supplied.
pub fn build_client_tls_config(
    connection_key: &str,
    insecure: bool,
) -> Result<ClientTlsConfig, TlsConfigError> {
    let trust_mode = TrustMode::select(insecure, !connection_key.is_empty())?;

    let identity = if trust_mode.requires_identity() {
        Some(parse_connection_key(connection_key)?)
    } else {
        None
    };

    if !trust_mode.verifies_server() {
        warn!("Server certificate verification disabled ({:?})", trust_mode);
    }
    debug!("Using trust mode {:?}", trust_mode);

    ClientTlsConfig::for_mode(trust_mode, identity)
}

/// Build a listener-side configuration that requires relays to present a
/// certificate issued by the same connection key
pub fn build_server_tls_config(
    identity: IdentityMaterial,
) -> Result<Arc<ServerConfig>, TlsConfigError> {
    ensure_crypto_provider();

    let mut roots = RootCertStore::empty();
    roots.add(identity.trust_anchor)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsConfigError::Verifier(e.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(identity.cert_chain, identity.private_key)?;

    Ok(Arc::new(config))
}
