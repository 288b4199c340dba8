//! CONNECT-only SOCKS5 server

use crate::proto::{
    read_greeting, read_request, write_method, write_reply, Command, Reply, TargetAddr,
    METHOD_NO_ACCEPTABLE, METHOD_NO_AUTH,
};
use crate::{SocksError, SocksResult};
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Serves SOCKS5 on any byte stream, connecting outbound over TCP
#[derive(Debug, Clone, Default)]
pub struct Socks5Server;

impl Socks5Server {
    /// Serve one SOCKS5 client on `stream` until either side closes
    pub async fn serve_stream<S>(&self, mut stream: S) -> SocksResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let methods = read_greeting(&mut stream).await?;
        if !methods.contains(&METHOD_NO_AUTH) {
            write_method(&mut stream, METHOD_NO_ACCEPTABLE).await?;
            return Err(SocksError::NoAcceptableMethod);
        }
        write_method(&mut stream, METHOD_NO_AUTH).await?;

        let request = match read_request(&mut stream).await {
            Ok(request) => request,
            Err(SocksError::UnsupportedAddressType(atyp)) => {
                write_reply(&mut stream, Reply::AddressTypeNotSupported, None).await?;
                return Err(SocksError::UnsupportedAddressType(atyp));
            }
            Err(e) => return Err(e),
        };

        if request.command != Command::Connect {
            write_reply(&mut stream, Reply::CommandNotSupported, None).await?;
            return Err(SocksError::UnsupportedCommand(request.command));
        }

        let target = request.target;
        let mut outbound = match self.connect(&target).await {
            Ok(outbound) => outbound,
            Err(source) => {
                debug!("SOCKS connect to {} failed: {}", target, source);
                write_reply(&mut stream, Reply::from_connect_error(&source), None).await?;
                return Err(SocksError::Connect { target, source });
            }
        };

        write_reply(&mut stream, Reply::Succeeded, outbound.local_addr().ok()).await?;
        debug!("SOCKS connected to {}", target);

        let (sent, received) = tokio::io::copy_bidirectional(&mut stream, &mut outbound).await?;
        trace!(
            "SOCKS stream to {} finished ({} bytes out, {} bytes in)",
            target,
            sent,
            received
        );
        Ok(())
    }

    async fn connect(&self, target: &TargetAddr) -> io::Result<TcpStream> {
        match target {
            TargetAddr::Ip(addr) => TcpStream::connect(addr).await,
            TargetAddr::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await,
        }
    }
}
