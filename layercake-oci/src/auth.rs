use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// HTTP authentication scheme of an [`Authorization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Bearer,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::Basic => f.write_str("Basic"),
            AuthScheme::Bearer => f.write_str("Bearer"),
        }
    }
}

/// Registry credentials, opaque to everything except the transport.
///
/// The token is only readable through [`Authorization::header_value`];
/// `Debug` output redacts it.
pub struct Authorization {
    scheme: AuthScheme,
    token: SecretString,
}

impl Authorization {
    /// A `Basic` credential from an already base64-encoded token.
    pub fn basic(token: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Basic,
            token: SecretString::from(token.into()),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: AuthScheme::Bearer,
            token: SecretString::from(token.into()),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Value for an HTTP `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token.expose_secret())
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("scheme", &self.scheme)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
