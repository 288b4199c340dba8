//! Connection keys and the TLS identity material derived from them
//!
//! A connection key is a 32-byte seed shared by a relay and the listener it
//! dials back to. Both ends derive the same Ed25519 certificate authority from
//! the seed, so each side can verify the other without any certificate files.

pub mod key;

pub use key::{
    generate_connection_key, listener_identity, parse_connection_key, ConnectionKey,
    IdentityMaterial, KeyParseError, SEED_LEN, SERVER_NAME,
};
