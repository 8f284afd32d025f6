//! Handshake state machines for both roles.
//!
//! The machines never touch a stream. A driver feeds them decoded messages
//! with `receive` and writes whatever `poll_transmit` hands back; each step
//! queues at most one outgoing message. Phases are ordered and only move
//! forward:
//!
//! `Start -> MethodNegotiation -> Authenticating -> Request -> Established -> Closed`
//!
//! A role may skip phases (`Authenticating` when no authentication is needed,
//! everything before `Request` for SOCKS4) but never returns to an earlier one.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use super::auth::{self, Credentials, PasswordStatus};
use super::v5::{self, AuthMethod, Greeting, MethodSelection, ReplyCode};
use super::{v4, Address, Encode, Error, Malformed, Result, Version};
use crate::config::{ClientConfig, ServerConfig};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    Start,
    /// A greeting is being answered. The client waits here for the
    /// selection; the server passes through while it picks a method.
    MethodNegotiation,
    Authenticating,
    Request,
    Established,
    Closed,
}

fn advance(phase: &mut Phase, next: Phase) {
    debug_assert!(next >= *phase, "phase moved back from {:?} to {:?}", phase, next);
    if next != *phase {
        trace!(from = ?phase, to = ?next, "phase change");
        *phase = next;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientMessage {
    Greeting(Greeting),
    Password(Credentials),
    Request(v5::Request),
    Socks4(v4::Request),
}

impl ClientMessage {
    fn name(&self) -> &'static str {
        match self {
            ClientMessage::Greeting(_) => "greeting",
            ClientMessage::Password(_) => "password request",
            ClientMessage::Request(_) => "request",
            ClientMessage::Socks4(_) => "SOCKS4 request",
        }
    }
}

impl Encode for ClientMessage {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            ClientMessage::Greeting(m) => m.encode_into(buf),
            ClientMessage::Password(m) => m.encode_into(buf),
            ClientMessage::Request(m) => m.encode_into(buf),
            ClientMessage::Socks4(m) => m.encode_into(buf),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerMessage {
    MethodSelection(MethodSelection),
    PasswordStatus(PasswordStatus),
    Reply(v5::Reply),
    Socks4Reply(v4::Reply),
}

impl ServerMessage {
    fn name(&self) -> &'static str {
        match self {
            ServerMessage::MethodSelection(_) => "method selection",
            ServerMessage::PasswordStatus(_) => "password status",
            ServerMessage::Reply(_) => "reply",
            ServerMessage::Socks4Reply(_) => "SOCKS4 reply",
        }
    }
}

impl Encode for ServerMessage {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            ServerMessage::MethodSelection(m) => m.encode_into(buf),
            ServerMessage::PasswordStatus(m) => m.encode_into(buf),
            ServerMessage::Reply(m) => m.encode_into(buf),
            ServerMessage::Socks4Reply(m) => m.encode_into(buf),
        }
    }
}

pub struct ServerHandshake {
    config: Arc<ServerConfig>,
    phase: Phase,
    version: Option<Version>,
    method: Option<AuthMethod>,
    request: Option<v5::Request>,
    transmit: Option<ServerMessage>,
}

impl ServerHandshake {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        ServerHandshake {
            config,
            phase: Phase::Start,
            version: None,
            method: None,
            request: None,
            transmit: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    /// The client's request, once received and until the session is closed.
    pub fn request(&self) -> Option<&v5::Request> {
        self.request.as_ref()
    }

    pub fn poll_transmit(&mut self) -> Option<ServerMessage> {
        self.transmit.take()
    }

    pub fn receive(&mut self, message: ClientMessage) -> Result<()> {
        match (self.phase, message) {
            (Phase::Start, ClientMessage::Greeting(greeting)) => self.on_greeting(greeting),
            (Phase::Start, ClientMessage::Socks4(request)) => self.on_socks4(request),
            (Phase::Authenticating, ClientMessage::Password(credentials)) => {
                self.on_password(credentials)
            }
            (Phase::Request, ClientMessage::Request(request)) if self.request.is_none() => {
                debug!(?request, "request received");
                self.request = Some(request);
                Ok(())
            }
            (_, message) => Err(self.violation(message.name())),
        }
    }

    /// Answers the pending request. A success moves the session to
    /// `Established`, anything else closes it.
    pub fn reply(&mut self, code: ReplyCode, bound: Address) -> Result<()> {
        if self.phase != Phase::Request || self.request.is_none() {
            return Err(self.violation("reply"));
        }

        let message = match self.version {
            Some(Version::Socks4) => ServerMessage::Socks4Reply(v4::Reply::from_v5(code, &bound)),
            _ => ServerMessage::Reply(v5::Reply::new(code, bound)),
        };
        self.transmit = Some(message);

        if code == ReplyCode::Succeeded {
            advance(&mut self.phase, Phase::Established);
        } else {
            info!(?code, "request refused");
            self.close();
        }
        Ok(())
    }

    /// Answers a SOCKS5 request that could not be decoded, then closes.
    pub fn reject(&mut self, malformed: &Malformed) -> Result<()> {
        if self.phase != Phase::Request || self.request.is_some() {
            return Err(self.violation("rejection"));
        }

        self.transmit = Some(ServerMessage::Reply(v5::Reply::failure(malformed.into())));
        self.close();
        Ok(())
    }

    pub fn close(&mut self) {
        advance(&mut self.phase, Phase::Closed);
    }

    fn on_greeting(&mut self, greeting: Greeting) -> Result<()> {
        self.version = Some(Version::Socks5);
        advance(&mut self.phase, Phase::MethodNegotiation);

        let Some(method) = auth::negotiate(greeting.methods(), &self.config.methods) else {
            warn!(offered = ?greeting.methods(), "no acceptable authentication method");
            self.transmit = Some(ServerMessage::MethodSelection(
                MethodSelection::no_acceptable(),
            ));
            self.close();
            return Err(Error::UnsupportedMethod);
        };

        debug!(?method, "authentication method selected");
        self.method = Some(method);
        self.transmit = Some(ServerMessage::MethodSelection(MethodSelection::new(method)));

        match method {
            AuthMethod::UserPass => advance(&mut self.phase, Phase::Authenticating),
            _ => advance(&mut self.phase, Phase::Request),
        }
        Ok(())
    }

    fn on_socks4(&mut self, request: v4::Request) -> Result<()> {
        self.version = Some(Version::Socks4);

        if !self.config.allow_socks4 || !self.config.supports(AuthMethod::NoAuth) {
            warn!("SOCKS4 client refused by configuration");
            self.transmit = Some(ServerMessage::Socks4Reply(v4::Reply::rejected_or_failed()));
            self.close();
            return Err(if self.config.allow_socks4 {
                Error::UnsupportedMethod
            } else {
                Malformed::Version(v4::VERSION).into()
            });
        }

        debug!(user_id = request.user_id(), ?request, "SOCKS4 request received");
        self.method = Some(AuthMethod::NoAuth);
        self.request = Some(request.into());
        advance(&mut self.phase, Phase::Request);
        Ok(())
    }

    fn on_password(&mut self, credentials: Credentials) -> Result<()> {
        let accepted = self.config.credentials.as_ref() == Some(&credentials);

        if !accepted {
            warn!(username = credentials.username(), "authentication failed");
            self.transmit = Some(ServerMessage::PasswordStatus(PasswordStatus::failure()));
            self.close();
            return Err(Error::AuthFailed);
        }

        debug!(username = credentials.username(), "authenticated");
        self.transmit = Some(ServerMessage::PasswordStatus(PasswordStatus::success()));
        advance(&mut self.phase, Phase::Request);
        Ok(())
    }

    fn violation(&mut self, message: &'static str) -> Error {
        let phase = self.phase;
        warn!(?phase, message, "out of sequence message");
        self.close();
        Error::ProtocolError { phase, message }
    }
}

pub struct ClientHandshake {
    config: ClientConfig,
    request: v5::Request,
    socks4: Option<v4::Request>,
    offered: Vec<AuthMethod>,
    phase: Phase,
    method: Option<AuthMethod>,
    bound: Option<Address>,
    transmit: Option<ClientMessage>,
}

impl ClientHandshake {
    /// Fails when `request` cannot be expressed in the configured version.
    pub fn new(config: ClientConfig, request: v5::Request) -> Result<Self> {
        let socks4 = match config.version {
            Version::Socks4 => Some(v4::Request::new(
                request.command(),
                request.destination().clone(),
                config.user_id.clone(),
            )?),
            Version::Socks5 => None,
        };

        Ok(ClientHandshake {
            config,
            request,
            socks4,
            offered: vec![],
            phase: Phase::Start,
            method: None,
            bound: None,
            transmit: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn version(&self) -> Version {
        self.config.version
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    /// Address the proxy reported in its success reply.
    pub fn bound(&self) -> Option<&Address> {
        self.bound.as_ref()
    }

    pub fn poll_transmit(&mut self) -> Option<ClientMessage> {
        self.transmit.take()
    }

    /// Queues the opening message.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Start {
            return Err(self.violation("start"));
        }

        match self.socks4.take() {
            Some(request) => {
                self.method = Some(AuthMethod::NoAuth);
                self.transmit = Some(ClientMessage::Socks4(request));
                advance(&mut self.phase, Phase::Request);
            }
            None => {
                self.offered = self.config.offered_methods();
                self.transmit = Some(ClientMessage::Greeting(Greeting::new(
                    self.offered.iter().copied(),
                )));
                advance(&mut self.phase, Phase::MethodNegotiation);
            }
        }
        Ok(())
    }

    pub fn receive(&mut self, message: ServerMessage) -> Result<()> {
        match (self.phase, self.config.version, message) {
            (Phase::MethodNegotiation, _, ServerMessage::MethodSelection(selection)) => {
                self.on_selection(selection)
            }
            (Phase::Authenticating, _, ServerMessage::PasswordStatus(status)) => {
                if !status.is_success() {
                    warn!("proxy rejected credentials");
                    self.close();
                    return Err(Error::AuthFailed);
                }
                self.send_request();
                Ok(())
            }
            (Phase::Request, Version::Socks5, ServerMessage::Reply(reply)) => {
                self.on_reply(reply.code(), reply.bound().clone())
            }
            (Phase::Request, Version::Socks4, ServerMessage::Socks4Reply(reply)) => {
                self.on_reply(reply.code().into(), reply.bound().into())
            }
            (_, _, message) => Err(self.violation(message.name())),
        }
    }

    pub fn close(&mut self) {
        advance(&mut self.phase, Phase::Closed);
    }

    fn on_selection(&mut self, selection: MethodSelection) -> Result<()> {
        let method = match selection.method() {
            None => {
                warn!(offered = ?self.offered, "proxy accepted none of the offered methods");
                self.close();
                return Err(Error::UnsupportedMethod);
            }
            Some(m) if !self.offered.contains(&m) => {
                return Err(self.violation("selection of a method never offered"))
            }
            Some(m) => m,
        };

        debug!(?method, "proxy selected authentication method");
        self.method = Some(method);

        match self.config.credentials.clone() {
            Some(credentials) if method == AuthMethod::UserPass => {
                self.transmit = Some(ClientMessage::Password(credentials));
                advance(&mut self.phase, Phase::Authenticating);
            }
            _ => self.send_request(),
        }
        Ok(())
    }

    fn send_request(&mut self) {
        self.transmit = Some(ClientMessage::Request(self.request.clone()));
        advance(&mut self.phase, Phase::Request);
    }

    fn on_reply(&mut self, code: ReplyCode, bound: Address) -> Result<()> {
        if code != ReplyCode::Succeeded {
            warn!(?code, "proxy refused request");
            self.close();
            return Err(Error::Rejected(code));
        }

        debug!(%bound, "proxy granted request");
        self.bound = Some(bound);
        advance(&mut self.phase, Phase::Established);
        Ok(())
    }

    fn violation(&mut self, message: &'static str) -> Error {
        let phase = self.phase;
        warn!(?phase, message, "out of sequence message");
        self.close();
        Error::ProtocolError { phase, message }
    }
}
