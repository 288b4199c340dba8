//! Listener address normalization

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Port a listener binds when none is given
pub const DEFAULT_LISTEN_PORT: u16 = 4080;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("address is empty")]
    Empty,

    #[error("missing host in address '{0}'")]
    MissingHost(String),

    #[error("invalid port in address '{0}'")]
    InvalidPort(String),

    #[error("malformed address '{0}'")]
    Malformed(String),
}

/// Address the relay dials, always carrying a port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelayTarget {
    host: String,
    port: u16,
}

impl RelayTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal,
    /// applying `default_port` when the input has none.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, TargetError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TargetError::Empty);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| TargetError::Malformed(input.to_string()))?;
            if host.is_empty() {
                return Err(TargetError::MissingHost(input.to_string()));
            }

            let port = match after {
                "" => default_port,
                _ => after
                    .strip_prefix(':')
                    .ok_or_else(|| TargetError::Malformed(input.to_string()))?
                    .parse()
                    .map_err(|_| TargetError::InvalidPort(input.to_string()))?,
            };

            return Ok(Self::new(host, port));
        }

        match input.rsplit_once(':') {
            None => Ok(Self::new(input, default_port)),
            // More than one colon and no brackets: a bare IPv6 literal
            Some((host, _)) if host.contains(':') => Ok(Self::new(input, default_port)),
            Some(("", _)) => Err(TargetError::MissingHost(input.to_string())),
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| TargetError::InvalidPort(input.to_string()))?;
                Ok(Self::new(host, port))
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for RelayTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, DEFAULT_LISTEN_PORT)
    }
}

impl fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_applied() {
        let target: RelayTarget = "example.com".parse().unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), DEFAULT_LISTEN_PORT);
        assert_eq!(target.to_string(), format!("example.com:{}", DEFAULT_LISTEN_PORT));
    }

    #[test]
    fn test_explicit_port_unchanged() {
        for input in ["example.com:9443", "10.0.0.1:443", "[::1]:9000"] {
            let target: RelayTarget = input.parse().unwrap();
            assert_eq!(target.to_string(), input);
        }
    }

    #[test]
    fn test_ipv6_without_port() {
        let bare: RelayTarget = "::1".parse().unwrap();
        let bracketed: RelayTarget = "[::1]".parse().unwrap();

        assert_eq!(bare, bracketed);
        assert_eq!(bare.host(), "::1");
        assert_eq!(bare.to_string(), "[::1]:4080");
    }

    #[test]
    fn test_custom_default_port() {
        let target = RelayTarget::parse("relay.internal", 7000).unwrap();
        assert_eq!(target.port(), 7000);
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(RelayTarget::parse("", 1), Err(TargetError::Empty));
        assert!(matches!(
            RelayTarget::parse(":4080", 1),
            Err(TargetError::MissingHost(_))
        ));
        assert!(matches!(
            RelayTarget::parse("example.com:http", 1),
            Err(TargetError::InvalidPort(_))
        ));
        assert!(matches!(
            RelayTarget::parse("example.com:70000", 1),
            Err(TargetError::InvalidPort(_))
        ));
        assert!(matches!(
            RelayTarget::parse("[::1", 1),
            Err(TargetError::Malformed(_))
        ));
    }
}
