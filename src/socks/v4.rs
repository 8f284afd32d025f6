// https://www.openssh.com/txt/socks4.protocol
// https://www.openssh.com/txt/socks4a.protocol

use std::net::{Ipv4Addr, SocketAddrV4};

use tokio::io::{AsyncRead, AsyncReadExt};

use super::v5::{self, Command};
use super::{
    expect_version, read_until_null, Address, Decode, Encode, Error, Host, Malformed, Result,
    MAX_FIELD_LEN,
};

pub const VERSION: u8 = 4;

pub const CMD_CONNECT: u8 = 1;
pub const CMD_BIND: u8 = 2;

pub const SOCKS4A_ADDRESS: [u8; 4] = [0, 0, 0, 1];

const RESP_VERSION: u8 = 0;
pub const RESP_CODE_GRANTED: u8 = 90;
pub const RESP_CODE_REJECT_OR_FAILED: u8 = 91;
pub const RESP_CODE_IDENTD_UNREACHABLE: u8 = 92;
pub const RESP_CODE_IDENTD_MISMATCH: u8 = 93;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, int_enum::IntEnum)]
pub enum ReplyCode {
    Granted = RESP_CODE_GRANTED,
    RejectedOrFailed = RESP_CODE_REJECT_OR_FAILED,
    IdentdUnreachable = RESP_CODE_IDENTD_UNREACHABLE,
    IdentdMismatch = RESP_CODE_IDENTD_MISMATCH,
}

impl From<v5::ReplyCode> for ReplyCode {
    fn from(value: v5::ReplyCode) -> Self {
        match value {
            v5::ReplyCode::Succeeded => ReplyCode::Granted,
            _ => ReplyCode::RejectedOrFailed,
        }
    }
}

impl From<ReplyCode> for v5::ReplyCode {
    fn from(value: ReplyCode) -> Self {
        match value {
            ReplyCode::Granted => v5::ReplyCode::Succeeded,
            ReplyCode::RejectedOrFailed => v5::ReplyCode::GeneralFailure,
            ReplyCode::IdentdUnreachable | ReplyCode::IdentdMismatch => {
                v5::ReplyCode::ConnectionNotAllowed
            }
        }
    }
}

/// SOCKS4 request; a domain destination is sent the SOCKS4a way.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    command: Command,
    destination: Address,
    user_id: String,
}

impl Request {
    pub fn new(command: Command, destination: Address, user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();

        if command == Command::UdpAssociate {
            return Err(Error::InvalidInput("SOCKS4 has no UDP ASSOCIATE"));
        }
        match destination.host() {
            Host::Ipv6(_) => return Err(Error::InvalidInput("SOCKS4 cannot carry IPv6")),
            Host::Ipv4(ip) if is_socks4a_marker(ip.octets()) => {
                return Err(Error::InvalidInput("0.0.0.x is reserved for SOCKS4a"))
            }
            Host::Domain(name) if name.contains('\0') => {
                return Err(Error::InvalidInput("SOCKS4a domain name cannot contain NUL"))
            }
            _ => {}
        }
        if user_id.len() > MAX_FIELD_LEN || user_id.contains('\0') {
            return Err(Error::InvalidInput("user id"));
        }

        Ok(Request {
            command,
            destination,
            user_id,
        })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    /// USERID is a byte string on the wire; only UTF-8 ids are decoded,
    /// anything else is `Malformed::NotUtf8`.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl From<Request> for v5::Request {
    fn from(value: Request) -> Self {
        v5::Request::new(value.command, value.destination)
    }
}

fn is_socks4a_marker(ip: [u8; 4]) -> bool {
    ip[..3] == [0, 0, 0] && ip[3] != 0
}

impl Decode for Request {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, VERSION).await?;

        let command = match stream.read_u8().await? {
            CMD_CONNECT => Command::Connect,
            CMD_BIND => Command::Bind,
            c => return Err(Malformed::Command(c).into()),
        };
        let dest_port = stream.read_u16().await?;
        let mut dest_addr: [u8; 4] = [0; 4];
        stream.read_exact(&mut dest_addr).await?;

        let user_id = read_until_null(stream, "user id").await?;

        let destination = if is_socks4a_marker(dest_addr) {
            let name = read_until_null(stream, "domain name").await?;
            if name.is_empty() {
                return Err(Malformed::Empty("domain name").into());
            }
            Address::domain(name, dest_port)?
        } else {
            SocketAddrV4::new(dest_addr.into(), dest_port).into()
        };

        Ok(Request {
            command,
            destination,
            user_id,
        })
    }
}

impl Encode for Request {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let cd = match self.command {
            Command::Bind => CMD_BIND,
            _ => CMD_CONNECT,
        };
        buf.extend_from_slice(&[VERSION, cd]);
        buf.extend_from_slice(&self.destination.port().to_be_bytes());

        match self.destination.host() {
            Host::Domain(name) => {
                buf.extend_from_slice(&SOCKS4A_ADDRESS);
                buf.extend_from_slice(self.user_id.as_bytes());
                buf.push(0);
                buf.extend_from_slice(name.as_bytes());
                buf.push(0);
            }
            host => {
                let ip = match host {
                    Host::Ipv4(ip) => *ip,
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                buf.extend_from_slice(&ip.octets());
                buf.extend_from_slice(self.user_id.as_bytes());
                buf.push(0);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reply {
    code: ReplyCode,
    bound: SocketAddrV4,
}

impl Reply {
    pub fn new(code: ReplyCode, bound: SocketAddrV4) -> Reply {
        Reply { code, bound }
    }

    pub fn granted(bound: SocketAddrV4) -> Reply {
        Reply::new(ReplyCode::Granted, bound)
    }

    pub fn rejected_or_failed() -> Reply {
        Reply::new(
            ReplyCode::RejectedOrFailed,
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        )
    }

    /// Translates a SOCKS5 outcome; non-IPv4 bound addresses become `0.0.0.0:0`.
    pub fn from_v5(code: v5::ReplyCode, bound: &Address) -> Reply {
        let bound = match bound.host() {
            Host::Ipv4(ip) => SocketAddrV4::new(*ip, bound.port()),
            _ => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        };
        Reply::new(code.into(), bound)
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn bound(&self) -> SocketAddrV4 {
        self.bound
    }

    pub fn is_granted(&self) -> bool {
        self.code == ReplyCode::Granted
    }

    pub fn to_buf(&self) -> [u8; 8] {
        let p = self.bound.port().to_be_bytes();
        let ip = self.bound.ip().octets();
        [
            RESP_VERSION,
            self.code as u8,
            p[0],
            p[1],
            ip[0],
            ip[1],
            ip[2],
            ip[3],
        ]
    }
}

impl Decode for Reply {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, RESP_VERSION).await?;

        let code = ReplyCode::try_from(stream.read_u8().await?).map_err(Malformed::ReplyCode)?;
        let port = stream.read_u16().await?;
        let mut ip = [0; 4];
        stream.read_exact(&mut ip).await?;

        Ok(Reply::new(code, SocketAddrV4::new(ip.into(), port)))
    }
}

impl Encode for Reply {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_buf());
    }
}
