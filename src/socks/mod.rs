use std::io;

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

mod address;
pub mod auth;
pub mod handshake;
mod session;
pub mod v4;
pub mod v5;

pub use address::{Address, Host};
pub use auth::Credentials;
pub use handshake::{ClientHandshake, ClientMessage, Phase, ServerHandshake, ServerMessage};
pub use session::{accept, connect, ClientSession, ServerSession};
pub use v5::{AuthMethod, Command, Reply, ReplyCode, Request};

/// Longest length-prefixed or NUL-terminated field any SOCKS frame carries.
pub const MAX_FIELD_LEN: usize = 255;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed Frame - {0}")]
    MalformedFrame(#[from] Malformed),
    #[error("Unexpected {message} while in phase {phase:?}")]
    ProtocolError { phase: Phase, message: &'static str },
    #[error("No Acceptable Authentication Method")]
    UnsupportedMethod,
    #[error("Authentication Failed")]
    AuthFailed,
    #[error("Request Rejected {0:?}")]
    Rejected(ReplyCode),
    #[error("Invalid Input - {0}")]
    InvalidInput(&'static str),
    #[error("Stream Closed")]
    StreamClosed,
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => Error::StreamClosed,
            _ => Error::Io(value),
        }
    }
}

/// Reasons a frame could not be decoded.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Malformed {
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("unsupported command {0}")]
    Command(u8),
    #[error("unsupported address type {0}")]
    AddressType(u8),
    #[error("unknown authentication method {0}")]
    Method(u8),
    #[error("unknown reply code {0}")]
    ReplyCode(u8),
    #[error("reserved byte is {0}")]
    Reserved(u8),
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("{0} is longer than 255 bytes")]
    TooLong(&'static str),
    #[error("{0} is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("frame is truncated")]
    Truncated,
    #[error("{0} bytes left after frame")]
    TrailingBytes(usize),
}

/// Protocol generation spoken on a session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Version {
    Socks4,
    #[default]
    Socks5,
}

#[allow(async_fn_in_trait)]
pub trait Decode: Sized {
    /// Reads exactly one frame from `stream`, consuming no bytes past its end.
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self>;
}

pub trait Encode {
    fn encode_into(&self, buf: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }
}

/// Decodes a single frame that must occupy all of `buf`.
pub fn decode<T: Decode>(buf: &[u8]) -> Result<T> {
    let mut rest = buf;
    let frame = T::decode_from(&mut rest)
        .now_or_never()
        .unwrap_or(Err(Error::StreamClosed))
        .map_err(|e| match e {
            Error::StreamClosed => Malformed::Truncated.into(),
            e => e,
        })?;

    if !rest.is_empty() {
        return Err(Malformed::TrailingBytes(rest.len()).into());
    }

    Ok(frame)
}

pub(crate) async fn write_frame(
    stream: &mut (impl AsyncWrite + Unpin),
    frame: &impl Encode,
) -> Result<()> {
    stream.write_all(&frame.encode()).await?;
    stream.flush().await?;
    Ok(())
}

pub(crate) async fn expect_version(
    stream: &mut (impl AsyncRead + Unpin),
    version: u8,
) -> Result<()> {
    let ver = stream.read_u8().await?;
    if ver != version {
        return Err(Malformed::Version(ver).into());
    }
    Ok(())
}

pub(crate) async fn read_string(
    stream: &mut (impl AsyncRead + Unpin),
    len: usize,
    field: &'static str,
) -> Result<String> {
    if len == 0 {
        return Err(Malformed::Empty(field).into());
    }

    let mut buf = vec![0; len];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8(buf).map_err(|_| Malformed::NotUtf8(field))?)
}

pub(crate) async fn read_until_null(
    stream: &mut (impl AsyncRead + Unpin),
    field: &'static str,
) -> Result<String> {
    let mut buf = Vec::new();

    let mut next = stream.read_u8().await?;
    while next != 0 {
        if buf.len() == MAX_FIELD_LEN {
            return Err(Malformed::TooLong(field).into());
        }
        buf.push(next);
        next = stream.read_u8().await?;
    }

    Ok(String::from_utf8(buf).map_err(|_| Malformed::NotUtf8(field))?)
}

pub(crate) fn push_string(buf: &mut Vec<u8>, value: &str) {
    buf.push(value.len() as u8);
    buf.extend_from_slice(value.as_bytes());
}

pub(crate) fn check_field(value: &str, field: &'static str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_FIELD_LEN {
        return Err(Error::InvalidInput(field));
    }
    Ok(())
}
