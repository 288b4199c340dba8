//! Connection key parsing and certificate derivation

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Length of the decoded connection key seed
pub const SEED_LEN: usize = 32;

/// Name the listener certificate is issued for and the relay expects
pub const SERVER_NAME: &str = "dialback";

// PKCS#8 v1 header for a bare Ed25519 private key (RFC 8410), followed by the 32-byte seed.
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

#[derive(Error, Debug)]
pub enum KeyParseError {
    #[error("connection key is empty")]
    Empty,

    #[error("connection key is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("connection key must decode to 32 bytes, got {0}")]
    Length(usize),

    #[error("derive certificate: {0}")]
    Certificate(#[from] rcgen::Error),
}

/// Certificates and key a peer presents, plus the trust anchor it verifies the other side with
#[derive(Debug)]
pub struct IdentityMaterial {
    /// Certificate authority derived from the connection key
    pub trust_anchor: CertificateDer<'static>,

    /// Leaf certificate chain presented to the peer
    pub cert_chain: Vec<CertificateDer<'static>>,

    /// Private key matching the leaf certificate
    pub private_key: PrivateKeyDer<'static>,

    /// Server name the listener certificate is issued for
    pub server_name: String,
}

/// A parsed connection key
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionKey {
    seed: [u8; SEED_LEN],
}

impl fmt::Debug for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionKey").finish_non_exhaustive()
    }
}

impl ConnectionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self { seed }
    }

    /// Parse the textual form of a key
    ///
    /// URL-safe base64 without padding is the canonical form; standard padded
    /// base64 is accepted as well.
    pub fn parse(key: &str) -> Result<Self, KeyParseError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(KeyParseError::Empty);
        }

        let decoded = match URL_SAFE_NO_PAD.decode(key) {
            Ok(bytes) => bytes,
            Err(url_safe_err) => STANDARD.decode(key).map_err(|_| url_safe_err)?,
        };

        let seed: [u8; SEED_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| KeyParseError::Length(decoded.len()))?;

        Ok(Self { seed })
    }

    /// Canonical textual form
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.seed)
    }

    /// Identity the relay presents when dialing the listener
    pub fn client_identity(&self) -> Result<IdentityMaterial, KeyParseError> {
        self.identity("dialback relay", ExtendedKeyUsagePurpose::ClientAuth)
    }

    /// Identity the listener presents to dialing relays
    pub fn listener_identity(&self) -> Result<IdentityMaterial, KeyParseError> {
        self.identity("dialback listener", ExtendedKeyUsagePurpose::ServerAuth)
    }

    fn identity(
        &self,
        common_name: &str,
        usage: ExtendedKeyUsagePurpose,
    ) -> Result<IdentityMaterial, KeyParseError> {
        let (authority, authority_key) = self.authority()?;

        let leaf_key = KeyPair::generate()?;
        let mut params = CertificateParams::new(vec![SERVER_NAME.to_string()])?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![usage];

        let leaf = params.signed_by(&leaf_key, &authority, &authority_key)?;

        debug!("Derived {} certificate from connection key", common_name);

        Ok(IdentityMaterial {
            trust_anchor: authority.der().clone(),
            cert_chain: vec![leaf.der().clone()],
            private_key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der())),
            server_name: SERVER_NAME.to_string(),
        })
    }

    /// Self-signed authority whose key comes straight from the seed.
    ///
    /// Serial number and validity are fixed so that both ends derive the
    /// same certificate.
    fn authority(&self) -> Result<(Certificate, KeyPair), KeyParseError> {
        let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + SEED_LEN);
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(&self.seed);
        let key_pair = KeyPair::try_from(pkcs8.as_slice())?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "dialback authority");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(SerialNumber::from(1u64));

        let cert = params.self_signed(&key_pair)?;
        Ok((cert, key_pair))
    }
}

/// Parse a connection key into the identity the relay presents
pub fn parse_connection_key(key: &str) -> Result<IdentityMaterial, KeyParseError> {
    ConnectionKey::parse(key)?.client_identity()
}

/// Parse a connection key into the identity a listener presents
pub fn listener_identity(key: &str) -> Result<IdentityMaterial, KeyParseError> {
    ConnectionKey::parse(key)?.listener_identity()
}

/// Generate a new connection key in its canonical textual form
pub fn generate_connection_key() -> String {
    ConnectionKey::generate().encode()
}
