//! Types for working with registry access secrets

use std::fmt;

use reqwest::blocking::RequestBuilder;
use reqwest::header::AUTHORIZATION;
use tracing::trace;

use crate::token_cache::RegistryToken;

/// Username that marks the password as a pre-encoded static credential, as
/// issued by Amazon ECR's `get-authorization-token`.
pub const STATIC_TOKEN_USERNAME: &str = "AWS";

/// A method for authenticating to a registry
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Access the registry anonymously
    Anonymous,

    /// Access the registry using HTTP Basic authentication
    Basic(String, String),
}

impl RegistryAuth {
    /// Build the authentication method from a username and password. Unless
    /// both are given, the registry is accessed anonymously.
    pub fn new(username: &str, password: &str) -> Self {
        if username.is_empty() || password.is_empty() {
            RegistryAuth::Anonymous
        } else {
            RegistryAuth::Basic(username.to_string(), password.to_string())
        }
    }

    /// The pre-encoded credential sent verbatim as `Basic` authorization on
    /// every registry request, if these credentials carry one.
    pub fn static_token(&self) -> Option<&str> {
        match self {
            RegistryAuth::Basic(username, password) if username == STATIC_TOKEN_USERNAME => {
                Some(password)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryAuth::Anonymous => f.write_str("Anonymous"),
            RegistryAuth::Basic(username, _) => f
                .debug_tuple("Basic")
                .field(username)
                .field(&"<redacted>")
                .finish(),
        }
    }
}

pub(crate) trait Authenticable {
    /// Credentials for the token service.
    fn apply_authentication(self, auth: &RegistryAuth) -> Self;

    /// Authorization for registry endpoints: the static credential wins over
    /// a bearer token, and nothing is sent without either.
    fn apply_authorization(self, auth: &RegistryAuth, token: Option<&RegistryToken>) -> Self;
}

impl Authenticable for RequestBuilder {
    fn apply_authentication(self, auth: &RegistryAuth) -> Self {
        match auth {
            RegistryAuth::Anonymous => self,
            RegistryAuth::Basic(username, password) => self.basic_auth(username, Some(password)),
        }
    }

    fn apply_authorization(self, auth: &RegistryAuth, token: Option<&RegistryToken>) -> Self {
        if let Some(credential) = auth.static_token() {
            trace!("Using static credential authentication.");
            return self.header(AUTHORIZATION, format!("Basic {}", credential));
        }
        match token {
            Some(token) => {
                trace!("Using bearer token authentication.");
                self.header(AUTHORIZATION, token.bearer_token())
            }
            None => self,
        }
    }
}
