//! SOCKS4, SOCKS4a and SOCKS5 handshakes for both ends of a proxy connection.
//!
//! [`socks::accept`] runs the server side and [`socks::connect`] the client
//! side over any tokio stream. [`socks::ServerHandshake`] and
//! [`socks::ClientHandshake`] are the I/O-free state machines underneath.

pub mod config;
pub mod forward;
pub mod socks;
