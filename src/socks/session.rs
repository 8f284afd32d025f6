use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::auth::{Credentials, PasswordStatus};
use super::handshake::{ClientHandshake, ClientMessage, Phase, ServerHandshake, ServerMessage};
use super::v5::{self, AuthMethod, Greeting, MethodSelection, ReplyCode};
use super::{v4, write_frame, Address, Decode, Error, Malformed, Result, Version};
use crate::config::{ClientConfig, ServerConfig};

/// Runs the server side of a handshake on `stream` until the client's request
/// is known. Answer it with [`ServerSession::reply`].
pub async fn accept<S>(stream: S, config: Arc<ServerConfig>) -> Result<ServerSession<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = ServerSession::new(stream, config);
    session.handshake().await?;

    info!(
        request = ?session.request(),
        version = ?session.version(),
        method = ?session.method(),
        "valid command"
    );
    Ok(session)
}

/// Runs the client side of a handshake on `stream`, an open connection to the
/// proxy, and returns once the proxy has granted `request`.
pub async fn connect<S>(
    stream: S,
    config: ClientConfig,
    request: v5::Request,
) -> Result<ClientSession<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = ClientSession {
        stream,
        handshake: ClientHandshake::new(config, request)?,
    };
    session.handshake().await?;

    debug!(bound = ?session.bound(), "proxy connection established");
    Ok(session)
}

pub struct ServerSession<S> {
    stream: S,
    handshake: ServerHandshake,
}

impl<S> ServerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: Arc<ServerConfig>) -> Self {
        ServerSession {
            stream,
            handshake: ServerHandshake::new(config),
        }
    }

    pub fn phase(&self) -> Phase {
        self.handshake.phase()
    }

    pub fn version(&self) -> Option<Version> {
        self.handshake.version()
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.handshake.method()
    }

    pub fn request(&self) -> Option<&v5::Request> {
        self.handshake.request()
    }

    pub async fn handshake(&mut self) -> Result<()> {
        let res = self.drive().await;
        if res.is_err() {
            self.handshake.close();
        }
        res
    }

    pub async fn reply(&mut self, code: ReplyCode, bound: Address) -> Result<()> {
        self.handshake.reply(code, bound)?;
        self.send().await
    }

    /// Hands the stream back for relaying. Only an established session has one to give.
    pub fn into_inner(self) -> Result<S> {
        match self.handshake.phase() {
            Phase::Established => Ok(self.stream),
            phase => Err(Error::ProtocolError {
                phase,
                message: "relay",
            }),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.handshake.close();
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn drive(&mut self) -> Result<()> {
        loop {
            let message = match self.handshake.phase() {
                Phase::Start => self.read_opening().await?,
                Phase::Authenticating => {
                    ClientMessage::Password(Credentials::decode_from(&mut self.stream).await?)
                }
                Phase::Request if self.handshake.request().is_some() => return Ok(()),
                Phase::Request => match v5::Request::decode_from(&mut self.stream).await {
                    Ok(request) => ClientMessage::Request(request),
                    Err(Error::MalformedFrame(malformed)) => {
                        self.handshake.reject(&malformed)?;
                        self.send().await?;
                        return Err(malformed.into());
                    }
                    Err(e) => return Err(e),
                },
                phase => {
                    return Err(Error::ProtocolError {
                        phase,
                        message: "handshake",
                    })
                }
            };

            let res = self.handshake.receive(message);
            let sent = self.send().await;
            res.and(sent)?;
        }
    }

    async fn read_opening(&mut self) -> Result<ClientMessage> {
        let ver = self.stream.read_u8().await?;

        debug!("handling connection with version {}", ver);

        let prefix = [ver];
        let mut stream = (&prefix[..]).chain(&mut self.stream);
        match ver {
            v4::VERSION => Ok(ClientMessage::Socks4(
                v4::Request::decode_from(&mut stream).await?,
            )),
            v5::VERSION => Ok(ClientMessage::Greeting(
                Greeting::decode_from(&mut stream).await?,
            )),
            _ => Err(Malformed::Version(ver).into()),
        }
    }

    async fn send(&mut self) -> Result<()> {
        if let Some(message) = self.handshake.poll_transmit() {
            write_frame(&mut self.stream, &message).await?;
        }
        Ok(())
    }
}

pub struct ClientSession<S> {
    stream: S,
    handshake: ClientHandshake,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn phase(&self) -> Phase {
        self.handshake.phase()
    }

    pub fn version(&self) -> Version {
        self.handshake.version()
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.handshake.method()
    }

    pub fn bound(&self) -> Option<&Address> {
        self.handshake.bound()
    }

    pub fn into_inner(self) -> Result<S> {
        match self.handshake.phase() {
            Phase::Established => Ok(self.stream),
            phase => Err(Error::ProtocolError {
                phase,
                message: "relay",
            }),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.handshake.close();
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        let res = self.drive().await;
        if res.is_err() {
            self.handshake.close();
        }
        res
    }

    async fn drive(&mut self) -> Result<()> {
        self.handshake.start()?;
        self.send().await?;

        loop {
            let message = match (self.handshake.phase(), self.handshake.version()) {
                (Phase::MethodNegotiation, _) => ServerMessage::MethodSelection(
                    MethodSelection::decode_from(&mut self.stream).await?,
                ),
                (Phase::Authenticating, _) => ServerMessage::PasswordStatus(
                    PasswordStatus::decode_from(&mut self.stream).await?,
                ),
                (Phase::Request, Version::Socks5) => {
                    ServerMessage::Reply(v5::Reply::decode_from(&mut self.stream).await?)
                }
                (Phase::Request, Version::Socks4) => {
                    ServerMessage::Socks4Reply(v4::Reply::decode_from(&mut self.stream).await?)
                }
                (Phase::Established, _) => return Ok(()),
                (phase, _) => {
                    return Err(Error::ProtocolError {
                        phase,
                        message: "handshake",
                    })
                }
            };

            let res = self.handshake.receive(message);
            let sent = self.send().await;
            res.and(sent)?;
        }
    }

    async fn send(&mut self) -> Result<()> {
        if let Some(message) = self.handshake.poll_transmit() {
            write_frame(&mut self.stream, &message).await?;
        }
        Ok(())
    }
}
