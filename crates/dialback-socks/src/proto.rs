//! SOCKS5 wire format (RFC 1928)

use crate::{SocksError, SocksResult};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SOCKS_VERSION: u8 = 0x05;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_NO_ACCEPTABLE: u8 = 0xff;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

/// Request command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Command::Connect,
            0x02 => Command::Bind,
            0x03 => Command::UdpAssociate,
            other => Command::Unknown(other),
        }
    }
}

/// Destination requested by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Reply field of the server response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl Reply {
    /// Map a failed outbound connect to the closest reply code
    pub fn from_connect_error(err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::ConnectionRefused {
            return Reply::ConnectionRefused;
        }
        if err.to_string().contains("network is unreachable") {
            return Reply::NetworkUnreachable;
        }
        Reply::HostUnreachable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub target: TargetAddr,
}

/// Read the method-selection message and return the offered methods
pub async fn read_greeting<R>(reader: &mut R) -> SocksResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(header[0]));
    }

    let mut methods = vec![0u8; header[1] as usize];
    reader.read_exact(&mut methods).await?;
    Ok(methods)
}

pub async fn write_method<W>(writer: &mut W, method: u8) -> SocksResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[SOCKS_VERSION, method]).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R>(reader: &mut R) -> SocksResult<Request>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(SocksError::UnsupportedVersion(header[0]));
    }
    let command = Command::from(header[1]);

    let target = match header[3] {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            reader.read_exact(&mut octets).await?;
            let port = reader.read_u16().await?;
            TargetAddr::Ip(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(octets),
                port,
            )))
        }
        ATYP_DOMAIN => {
            let len = reader.read_u8().await? as usize;
            let mut domain = vec![0u8; len];
            reader.read_exact(&mut domain).await?;
            let port = reader.read_u16().await?;
            let domain = String::from_utf8(domain)
                .map_err(|_| SocksError::InvalidDomain)?;
            if domain.is_empty() {
                return Err(SocksError::InvalidDomain);
            }
            TargetAddr::Domain(domain, port)
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            reader.read_exact(&mut octets).await?;
            let port = reader.read_u16().await?;
            TargetAddr::Ip(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                0,
                0,
            )))
        }
        other => return Err(SocksError::UnsupportedAddressType(other)),
    };

    Ok(Request { command, target })
}

/// Write a reply; `bound` defaults to `0.0.0.0:0`
pub async fn write_reply<W>(
    writer: &mut W,
    reply: Reply,
    bound: Option<SocketAddr>,
) -> SocksResult<()>
where
    W: AsyncWrite + Unpin,
{
    let unspecified = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    let bound = bound.unwrap_or(unspecified);

    let mut buf = Vec::with_capacity(22);
    buf.extend_from_slice(&[SOCKS_VERSION, reply as u8, 0x00]);
    match bound {
        SocketAddr::V4(addr) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&addr.ip().octets());
        }
        SocketAddr::V6(addr) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&addr.ip().octets());
        }
    }
    buf.extend_from_slice(&bound.port().to_be_bytes());

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_greeting() {
        let mut input: &[u8] = &[0x05, 0x02, 0x00, 0x02];
        assert_eq!(read_greeting(&mut input).await.unwrap(), vec![0x00, 0x02]);

        let mut socks4: &[u8] = &[0x04, 0x01, 0x00];
        assert!(matches!(
            read_greeting(&mut socks4).await,
            Err(SocksError::UnsupportedVersion(0x04))
        ));
    }

    #[tokio::test]
    async fn test_read_request_address_types() {
        let mut ipv4: &[u8] = &[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0x01, 0xbb];
        let request = read_request(&mut ipv4).await.unwrap();
        assert_eq!(request.command, Command::Connect);
        assert_eq!(
            request.target,
            TargetAddr::Ip("10.0.0.1:443".parse().unwrap())
        );

        let mut domain = vec![0x05, 0x01, 0x00, 0x03, 11];
        domain.extend_from_slice(b"example.com");
        domain.extend_from_slice(&80u16.to_be_bytes());
        let request = read_request(&mut domain.as_slice()).await.unwrap();
        assert_eq!(
            request.target,
            TargetAddr::Domain("example.com".to_string(), 80)
        );

        let mut ipv6 = vec![0x05, 0x01, 0x00, 0x04];
        ipv6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        ipv6.extend_from_slice(&8080u16.to_be_bytes());
        let request = read_request(&mut ipv6.as_slice()).await.unwrap();
        assert_eq!(
            request.target,
            TargetAddr::Ip("[::1]:8080".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_read_request_rejects_bad_input() {
        let mut bad_atyp: &[u8] = &[0x05, 0x01, 0x00, 0x09];
        assert!(matches!(
            read_request(&mut bad_atyp).await,
            Err(SocksError::UnsupportedAddressType(0x09))
        ));

        let mut empty_domain: &[u8] = &[0x05, 0x01, 0x00, 0x03, 0, 0, 80];
        assert!(matches!(
            read_request(&mut empty_domain).await,
            Err(SocksError::InvalidDomain)
        ));

        let mut truncated: &[u8] = &[0x05, 0x01, 0x00, 0x01, 127];
        assert!(matches!(
            read_request(&mut truncated).await,
            Err(SocksError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_write_reply() {
        let mut out = Vec::new();
        write_reply(
            &mut out,
            Reply::Succeeded,
            Some("127.0.0.1:1080".parse().unwrap()),
        )
        .await
        .unwrap();
        assert_eq!(out, vec![0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38]);

        let mut out = Vec::new();
        write_reply(&mut out, Reply::CommandNotSupported, None)
            .await
            .unwrap();
        assert_eq!(out, vec![0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_reply_from_connect_error() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            Reply::from_connect_error(&refused),
            Reply::ConnectionRefused
        );

        let unreachable = io::Error::new(io::ErrorKind::Other, "network is unreachable");
        assert_eq!(
            Reply::from_connect_error(&unreachable),
            Reply::NetworkUnreachable
        );

        let other = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert_eq!(
            Reply::from_connect_error(&other),
            Reply::HostUnreachable
        );
    }
}
