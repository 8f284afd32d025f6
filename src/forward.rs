//! Plain TCP forwarding behind the handshake: the CONNECT half of a proxy.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::socks::{self, Address, Command, Host, ReplyCode};

#[derive(Debug, thiserror::Error)]
pub enum Errors {
    #[error("Lookup Failed {0:?}")]
    LookupFailed(#[source] io::Error),
    #[error("No Addresses For {0}")]
    NoAddresses(String),
    #[error("Connect Failed {0:?}")]
    ConnectFailed(#[source] io::Error),
}

impl From<&Errors> for ReplyCode {
    fn from(value: &Errors) -> Self {
        match value {
            Errors::LookupFailed(_) | Errors::NoAddresses(_) => ReplyCode::HostUnreachable,
            Errors::ConnectFailed(e) => match e.kind() {
                io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
                io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
                io::ErrorKind::TimedOut | io::ErrorKind::AddrNotAvailable => {
                    ReplyCode::HostUnreachable
                }
                _ => ReplyCode::GeneralFailure,
            },
        }
    }
}

pub async fn resolve(address: &Address) -> Result<Vec<SocketAddr>, Errors> {
    let addrs: Vec<SocketAddr> = match address.host() {
        Host::Domain(name) => lookup_host((name.as_str(), address.port()))
            .await
            .map_err(Errors::LookupFailed)?
            .collect(),
        _ => address.to_socket_addr().into_iter().collect(),
    };

    if addrs.is_empty() {
        return Err(Errors::NoAddresses(address.to_string()));
    }
    Ok(addrs)
}

/// Connects to the first reachable address `address` resolves to.
pub async fn connect(address: &Address) -> Result<TcpStream, Errors> {
    let mut last_err = None;
    for addr in resolve(address).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(Errors::ConnectFailed(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to connect to")
    })))
}

/// Handles one client connection end to end: handshake, outbound connect,
/// reply, then byte relay until either side closes.
pub async fn serve<S>(stream: S, config: Arc<ServerConfig>) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = socks::accept(stream, config).await?;
    let request = session
        .request()
        .cloned()
        .context("handshake finished without a request")?;

    if request.command() != Command::Connect {
        warn!(command = ?request.command(), "command not supported");
        session
            .reply(ReplyCode::CommandNotSupported, Address::unspecified())
            .await?;
        return Ok(());
    }

    let mut upstream = match connect(request.destination()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            session
                .reply(ReplyCode::from(&e), Address::unspecified())
                .await?;
            return Err(e.into());
        }
    };

    session
        .reply(ReplyCode::Succeeded, upstream.local_addr()?.into())
        .await?;

    let mut client = session.into_inner()?;
    let (sent, received) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;

    debug!(sent, received, "connection closed");
    Ok(())
}
