use crate::socks::{AuthMethod, Credentials, Error, Result, Version};

/// Server-side policy, shared read-only by every session.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Methods the server accepts. The client's preference decides between them.
    pub methods: Vec<AuthMethod>,
    /// Account checked during username/password authentication.
    pub credentials: Option<Credentials>,
    /// Accept SOCKS4 and SOCKS4a clients. They can only use `NoAuth`.
    pub allow_socks4: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            methods: vec![AuthMethod::NoAuth],
            credentials: None,
            allow_socks4: true,
        }
    }
}

impl ServerConfig {
    /// Requires username/password and refuses SOCKS4.
    pub fn with_credentials(credentials: Credentials) -> Self {
        ServerConfig {
            methods: vec![AuthMethod::UserPass],
            credentials: Some(credentials),
            allow_socks4: false,
        }
    }

    pub fn supports(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            return Err(Error::InvalidInput("at least one method must be supported"));
        }
        if self.supports(AuthMethod::Gssapi) {
            return Err(Error::InvalidInput("GSSAPI is not implemented"));
        }
        if self.supports(AuthMethod::UserPass) && self.credentials.is_none() {
            return Err(Error::InvalidInput(
                "username/password needs configured credentials",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub version: Version,
    /// Offered after `NoAuth` when present. SOCKS4 ignores them.
    pub credentials: Option<Credentials>,
    /// SOCKS4 USERID field.
    pub user_id: String,
}

impl ClientConfig {
    pub fn socks4(user_id: impl Into<String>) -> Self {
        ClientConfig {
            version: Version::Socks4,
            credentials: None,
            user_id: user_id.into(),
        }
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        ClientConfig {
            credentials: Some(credentials),
            ..Default::default()
        }
    }

    /// Methods in the order they are offered to the server.
    pub fn offered_methods(&self) -> Vec<AuthMethod> {
        let mut methods = vec![AuthMethod::NoAuth];
        if self.credentials.is_some() {
            methods.push(AuthMethod::UserPass);
        }
        methods
    }
}
