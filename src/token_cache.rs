use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::errors::{ProbeError, Result};

/// A token granted during the OAuth2-like workflow for Docker registries.
#[derive(Deserialize, Clone)]
#[serde(untagged)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RegistryToken {
    Token {
        #[serde(alias = "Token")]
        token: String,
    },
    AccessToken {
        access_token: String,
    },
}

impl fmt::Debug for RegistryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = String::from("<redacted>");
        match self {
            RegistryToken::Token { .. } => {
                f.debug_struct("Token").field("token", &redacted).finish()
            }
            RegistryToken::AccessToken { .. } => f
                .debug_struct("AccessToken")
                .field("access_token", &redacted)
                .finish(),
        }
    }
}

impl RegistryToken {
    /// Decode the body of a token service response. An empty token is
    /// rejected rather than cached.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let token: RegistryToken =
            serde_json::from_reader(reader).map_err(ProbeError::TokenDecodeError)?;
        if token.token().is_empty() {
            return Err(ProbeError::MissingToken);
        }
        Ok(token)
    }

    pub fn bearer_token(&self) -> String {
        format!("Bearer {}", self.token())
    }

    pub fn token(&self) -> &str {
        match self {
            RegistryToken::Token { token } => token,
            RegistryToken::AccessToken { access_token } => access_token,
        }
    }
}

/// The bearer token of a single repository handle.
///
/// Absent until the first successful login, then reused for every request of
/// the handle. It is never shared between handles and never expires on its
/// own: a new 401 challenge replaces it.
#[derive(Debug, Default, Clone)]
pub(crate) struct TokenCache {
    token: Option<RegistryToken>,
}

impl TokenCache {
    pub(crate) fn insert(&mut self, token: RegistryToken) {
        debug!(replaced = self.token.is_some(), "Inserting token");
        self.token = Some(token);
    }

    pub(crate) fn get(&self) -> Option<&RegistryToken> {
        self.token.as_ref()
    }
}
