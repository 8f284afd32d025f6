use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use tokio::io::{AsyncRead, AsyncReadExt};

use super::v5::{ATYPE_DNS, ATYPE_IPV4, ATYPE_IPV6};
use super::{check_field, push_string, read_string, Malformed, Result};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

/// A destination or bound endpoint. Domain names are 1 to 255 bytes.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Address {
    host: Host,
    port: u16,
}

impl Address {
    pub fn new(host: Host, port: u16) -> Result<Self> {
        if let Host::Domain(name) = &host {
            check_field(name, "domain name must be 1 to 255 bytes")?;
        }
        Ok(Address { host, port })
    }

    pub fn domain(name: impl Into<String>, port: u16) -> Result<Self> {
        Address::new(Host::Domain(name.into()), port)
    }

    /// `0.0.0.0:0`, used as the bound address of failure replies.
    pub fn unspecified() -> Self {
        Ipv4Addr::UNSPECIFIED.into()
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match &self.host {
            Host::Ipv4(ip) => Some(SocketAddrV4::new(*ip, self.port).into()),
            Host::Ipv6(ip) => Some(SocketAddrV6::new(*ip, self.port, 0, 0).into()),
            Host::Domain(_) => None,
        }
    }

    pub(crate) fn address_type(&self) -> u8 {
        match self.host {
            Host::Ipv4(_) => ATYPE_IPV4,
            Host::Ipv6(_) => ATYPE_IPV6,
            Host::Domain(_) => ATYPE_DNS,
        }
    }

    /// Reads the `ADDR PORT` tail of a SOCKS5 frame whose `ATYP` byte was already consumed.
    pub(crate) async fn decode_from(
        stream: &mut (impl AsyncRead + Unpin),
        atype: u8,
    ) -> Result<Self> {
        let host = match atype {
            ATYPE_IPV4 => {
                let mut addr = [0; 4];
                stream.read_exact(&mut addr).await?;
                Host::Ipv4(addr.into())
            }
            ATYPE_IPV6 => {
                let mut addr = [0; 16];
                stream.read_exact(&mut addr).await?;
                Host::Ipv6(addr.into())
            }
            ATYPE_DNS => {
                let size = stream.read_u8().await?;
                Host::Domain(read_string(stream, size as usize, "domain name").await?)
            }
            t => return Err(Malformed::AddressType(t).into()),
        };

        let port = stream.read_u16().await?;

        Ok(Address { host, port })
    }

    /// Writes `ATYP ADDR PORT` in SOCKS5 layout.
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.address_type());
        match &self.host {
            Host::Ipv4(ip) => buf.extend_from_slice(&ip.octets()),
            Host::Ipv6(ip) => buf.extend_from_slice(&ip.octets()),
            Host::Domain(name) => push_string(buf, name),
        }
        buf.extend_from_slice(&self.port.to_be_bytes());
    }
}

impl From<SocketAddr> for Address {
    fn from(value: SocketAddr) -> Self {
        let host = match value.ip() {
            IpAddr::V4(ip) => Host::Ipv4(ip),
            IpAddr::V6(ip) => Host::Ipv6(ip),
        };
        Address {
            host,
            port: value.port(),
        }
    }
}

impl From<SocketAddrV4> for Address {
    fn from(value: SocketAddrV4) -> Self {
        SocketAddr::V4(value).into()
    }
}

impl From<Ipv4Addr> for Address {
    fn from(value: Ipv4Addr) -> Self {
        SocketAddrV4::new(value, 0).into()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Host::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Host::Domain(name) => write!(f, "{}:{}", name, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::Error;

    #[test]
    fn domain_length_is_checked() {
        assert!(Address::domain("example.com", 80).is_ok());
        assert!(matches!(
            Address::domain("", 80),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Address::domain("a".repeat(256), 80),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn unspecified_encodes_as_ipv4_zero() {
        let mut buf = Vec::new();
        Address::unspecified().encode_into(&mut buf);

        assert_eq!(buf, vec![ATYPE_IPV4, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn dns_address() {
        let mut buf = Vec::new();
        Address::domain("example.com", 443).unwrap().encode_into(&mut buf);

        assert_eq!(
            buf,
            vec![ATYPE_DNS, 11, 101, 120, 97, 109, 112, 108, 101, 46, 99, 111, 109, 0x01, 0xBB]
        );
    }

    #[test]
    fn display() {
        let v6: SocketAddr = "[2001:db8::1]:8080".parse().unwrap();

        assert_eq!(Address::from(v6).to_string(), "[2001:db8::1]:8080");
        assert_eq!(
            Address::domain("example.com", 22).unwrap().to_string(),
            "example.com:22"
        );
        assert_eq!(Address::domain("example.com", 22).unwrap().to_socket_addr(), None);
    }
}
