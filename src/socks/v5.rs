// https://www.rfc-editor.org/rfc/rfc1928

use tokio::io::{AsyncRead, AsyncReadExt};

use super::{expect_version, Address, Decode, Encode, Malformed, Result};

pub const VERSION: u8 = 5;

pub const AUTH_NOT_REQUIRED: u8 = 0x00;
pub const AUTH_GSSAPI: u8 = 0x01;
pub const AUTH_USER_PASS: u8 = 0x02;
pub const AUTH_NONE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;
pub const CMD_BIND: u8 = 0x02;
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

pub const ATYPE_IPV4: u8 = 0x01;
pub const ATYPE_IPV6: u8 = 0x04;
pub const ATYPE_DNS: u8 = 0x03;

pub const RESP_SUCCEEDED: u8 = 0x00;
pub const RESP_GENERAL_FAILURE: u8 = 0x01;
pub const RESP_DENIED: u8 = 0x02;
pub const RESP_NETWORK_UNREACHABLE: u8 = 0x03;
pub const RESP_HOST_UNREACHABLE: u8 = 0x04;
pub const RESP_CONNECTION_REFUSED: u8 = 0x05;
pub const RESP_TTL_EXPIRED: u8 = 0x06;
pub const RESP_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const RESP_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

const RESERVED: u8 = 0x00;

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, int_enum::IntEnum)]
pub enum AuthMethod {
    NoAuth = AUTH_NOT_REQUIRED,
    Gssapi = AUTH_GSSAPI,
    UserPass = AUTH_USER_PASS,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, int_enum::IntEnum)]
pub enum Command {
    Connect = CMD_CONNECT,
    Bind = CMD_BIND,
    UdpAssociate = CMD_UDP_ASSOCIATE,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, int_enum::IntEnum)]
pub enum ReplyCode {
    Succeeded = RESP_SUCCEEDED,
    GeneralFailure = RESP_GENERAL_FAILURE,
    ConnectionNotAllowed = RESP_DENIED,
    NetworkUnreachable = RESP_NETWORK_UNREACHABLE,
    HostUnreachable = RESP_HOST_UNREACHABLE,
    ConnectionRefused = RESP_CONNECTION_REFUSED,
    TtlExpired = RESP_TTL_EXPIRED,
    CommandNotSupported = RESP_COMMAND_NOT_SUPPORTED,
    AddressTypeNotSupported = RESP_ADDRESS_NOT_SUPPORTED,
}

impl From<&Malformed> for ReplyCode {
    fn from(value: &Malformed) -> Self {
        match value {
            Malformed::Command(_) => ReplyCode::CommandNotSupported,
            Malformed::AddressType(_) => ReplyCode::AddressTypeNotSupported,
            _ => ReplyCode::GeneralFailure,
        }
    }
}

/// Method offer opening a SOCKS5 connection, in client preference order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Greeting {
    methods: Vec<AuthMethod>,
}

impl Greeting {
    pub fn new(methods: impl IntoIterator<Item = AuthMethod>) -> Greeting {
        let mut offered = Vec::new();
        for method in methods {
            if !offered.contains(&method) {
                offered.push(method);
            }
        }
        Greeting { methods: offered }
    }

    pub fn methods(&self) -> &[AuthMethod] {
        &self.methods
    }

    pub fn contains(&self, method: &AuthMethod) -> bool {
        self.methods.contains(method)
    }
}

impl Decode for Greeting {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, VERSION).await?;

        let method_count = stream.read_u8().await?;
        if method_count == 0 {
            return Ok(Greeting { methods: vec![] });
        }

        let mut buf: Vec<u8> = vec![0; method_count as usize];
        stream.read_exact(&mut buf).await?;

        // Methods we do not know (private range, CHAP, ...) can never be selected.
        Ok(Greeting::new(
            buf.into_iter().filter_map(|v| AuthMethod::try_from(v).ok()),
        ))
    }
}

impl Encode for Greeting {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(VERSION);
        buf.push(self.methods.len() as u8);
        buf.extend(self.methods.iter().map(|m| *m as u8));
    }
}

/// The server's pick from a [`Greeting`]; `None` is `X'FF'`, no acceptable method.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MethodSelection {
    method: Option<AuthMethod>,
}

impl MethodSelection {
    pub fn new(method: AuthMethod) -> MethodSelection {
        MethodSelection {
            method: Some(method),
        }
    }

    pub fn no_acceptable() -> MethodSelection {
        MethodSelection { method: None }
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }
}

impl Decode for MethodSelection {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, VERSION).await?;

        let method = match stream.read_u8().await? {
            AUTH_NONE => None,
            m => Some(AuthMethod::try_from(m).map_err(Malformed::Method)?),
        };

        Ok(MethodSelection { method })
    }
}

impl Encode for MethodSelection {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(VERSION);
        buf.push(self.method.map_or(AUTH_NONE, |m| m as u8));
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    command: Command,
    destination: Address,
}

impl Request {
    pub fn new(command: Command, destination: Address) -> Request {
        Request {
            command,
            destination,
        }
    }

    pub fn connect(destination: Address) -> Request {
        Request::new(Command::Connect, destination)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }
}

impl Decode for Request {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, VERSION).await?;

        let command =
            Command::try_from(stream.read_u8().await?).map_err(Malformed::Command)?;

        let rsv = stream.read_u8().await?;
        if rsv != RESERVED {
            return Err(Malformed::Reserved(rsv).into());
        }

        let atype = stream.read_u8().await?;
        let destination = Address::decode_from(stream, atype).await?;

        Ok(Request {
            command,
            destination,
        })
    }
}

impl Encode for Request {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[VERSION, self.command as u8, RESERVED]);
        self.destination.encode_into(buf);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reply {
    code: ReplyCode,
    bound: Address,
}

impl Reply {
    pub fn new(code: ReplyCode, bound: Address) -> Reply {
        Reply { code, bound }
    }

    pub fn success(bound: Address) -> Reply {
        Reply::new(ReplyCode::Succeeded, bound)
    }

    /// A failure reply carrying `0.0.0.0:0` as bound address.
    pub fn failure(code: ReplyCode) -> Reply {
        Reply::new(code, Address::unspecified())
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn bound(&self) -> &Address {
        &self.bound
    }

    pub fn is_success(&self) -> bool {
        self.code == ReplyCode::Succeeded
    }
}

impl Decode for Reply {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, VERSION).await?;

        let code = ReplyCode::try_from(stream.read_u8().await?).map_err(Malformed::ReplyCode)?;

        let rsv = stream.read_u8().await?;
        if rsv != RESERVED {
            return Err(Malformed::Reserved(rsv).into());
        }

        let atype = stream.read_u8().await?;
        let bound = Address::decode_from(stream, atype).await?;

        Ok(Reply { code, bound })
    }
}

impl Encode for Reply {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[VERSION, self.code as u8, RESERVED]);
        self.bound.encode_into(buf);
    }
}

#[cfg(test)]
mod tests;
