// https://www.rfc-editor.org/rfc/rfc1929

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::v5::AuthMethod;
use super::{check_field, expect_version, push_string, read_string, Decode, Encode, Result};

pub const SUBNEGOTIATION_VERSION: u8 = 0x01;

const STATUS_SUCCESS: u8 = 0x00;
const STATUS_FAILURE: u8 = 0x01;

/// Picks the first method in `offered` (client preference order) that the
/// server lists in `supported`. `None` means no acceptable method.
///
/// GSSAPI is never picked; there is no implementation of its sub-negotiation.
pub fn negotiate(offered: &[AuthMethod], supported: &[AuthMethod]) -> Option<AuthMethod> {
    offered
        .iter()
        .copied()
        .filter(|m| *m != AuthMethod::Gssapi)
        .find(|m| supported.contains(m))
}

/// Username/password pair, also the body of the RFC 1929 request
/// `VER ULEN UNAME PLEN PASSWD`.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        check_field(&username, "username must be 1 to 255 bytes")?;
        check_field(&password, "password must be 1 to 255 bytes")?;

        Ok(Credentials { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Decode for Credentials {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, SUBNEGOTIATION_VERSION).await?;

        let ulen = stream.read_u8().await?;
        let username = read_string(stream, ulen as usize, "username").await?;
        let plen = stream.read_u8().await?;
        let password = read_string(stream, plen as usize, "password").await?;

        Ok(Credentials { username, password })
    }
}

impl Encode for Credentials {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(SUBNEGOTIATION_VERSION);
        push_string(buf, &self.username);
        push_string(buf, &self.password);
    }
}

/// Server verdict on a [`Credentials`] request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PasswordStatus {
    success: bool,
}

impl PasswordStatus {
    pub fn success() -> PasswordStatus {
        PasswordStatus { success: true }
    }

    pub fn failure() -> PasswordStatus {
        PasswordStatus { success: false }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl Decode for PasswordStatus {
    async fn decode_from(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        expect_version(stream, SUBNEGOTIATION_VERSION).await?;

        // Any non-zero status is a failure.
        let success = stream.read_u8().await? == STATUS_SUCCESS;

        Ok(PasswordStatus { success })
    }
}

impl Encode for PasswordStatus {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let status = if self.success {
            STATUS_SUCCESS
        } else {
            STATUS_FAILURE
        };
        buf.extend_from_slice(&[SUBNEGOTIATION_VERSION, status]);
    }
}
