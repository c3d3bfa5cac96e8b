//! Docker Registry v2 transport
//!
//! Issues the manifest and blob requests of a single repository, attaching
//! content negotiation and authorization headers, and runs the token exchange
//! advertised by a `WWW-Authenticate: Bearer` challenge.

use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::header::{HeaderValue, ACCEPT, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::errors::{Document, ProbeError, Result};
use crate::manifest::{ImageConfiguration, MIME_TYPES_DISTRIBUTION_MANIFEST, MIME_TYPES_IMAGE_CONFIG};
use crate::platform::ImageConfigSource;
use crate::reference::Reference;
use crate::regexp::{must_compile, AUTH_PARAM_REGEXP};
use crate::secrets::{Authenticable, RegistryAuth};
use crate::token_cache::{RegistryToken, TokenCache};

lazy_static! {
    static ref AUTH_PARAM: Regex = must_compile(AUTH_PARAM_REGEXP);
}

/// The transport of one repository handle.
///
/// Owns the bearer token obtained for the repository. Token mutation goes
/// through `&mut self`, so a client is used by one caller at a time.
pub(crate) struct Client {
    client: reqwest::blocking::Client,
    protocol: ClientProtocol,
    reference: Reference,
    auth: RegistryAuth,
    tokens: TokenCache,
}

impl Client {
    /// Create a client, failing if the configured HTTP client cannot be built
    pub(crate) fn try_new(
        reference: Reference,
        auth: RegistryAuth,
        config: ClientConfig,
    ) -> Result<Self> {
        let client = build_http_client(&config)?;
        Ok(Client {
            client,
            protocol: config.protocol,
            reference,
            auth,
            tokens: TokenCache::default(),
        })
    }

    /// Create a client, falling back to a default HTTP client when the
    /// configured one cannot be built
    pub(crate) fn new(reference: Reference, auth: RegistryAuth, config: ClientConfig) -> Self {
        match build_http_client(&config) {
            Ok(client) => Client {
                client,
                protocol: config.protocol,
                reference,
                auth,
                tokens: TokenCache::default(),
            },
            Err(err) => {
                warn!("Cannot create registry client from config: {:?}", err);
                warn!("Creating client with default configuration");
                Client {
                    client: reqwest::blocking::Client::default(),
                    protocol: config.protocol,
                    reference,
                    auth,
                    tokens: TokenCache::default(),
                }
            }
        }
    }

    pub(crate) fn reference(&self) -> &Reference {
        &self.reference
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.tokens.get().map(RegistryToken::token)
    }

    /// HEAD the manifest of `tag`. The response is returned whatever its
    /// status; it carries no body.
    pub(crate) fn probe_tag(&self, tag: &str) -> Result<Response> {
        let url = self.to_v2_manifest_url(tag);
        debug!("HEAD image manifest from {}", url);
        let res = self
            .registry_request(Method::HEAD, &url, MIME_TYPES_DISTRIBUTION_MANIFEST)
            .send()?;
        Ok(res)
    }

    /// GET the manifest of `tag`. The response is returned whatever its
    /// status so that the caller can answer a challenge.
    pub(crate) fn fetch_manifest(&self, tag: &str) -> Result<Response> {
        let url = self.to_v2_manifest_url(tag);
        debug!("Pulling image manifest from {}", url);
        let res = self
            .registry_request(Method::GET, &url, MIME_TYPES_DISTRIBUTION_MANIFEST)
            .send()?;
        Ok(res)
    }

    /// GET the image configuration blob `digest`.
    pub(crate) fn fetch_config(&self, digest: &str) -> Result<Response> {
        let url = self.to_v2_blob_url(digest);
        debug!("Pulling image config from {}", url);
        let res = self
            .registry_request(Method::GET, &url, MIME_TYPES_IMAGE_CONFIG)
            .send()?;
        match res.status() {
            StatusCode::OK => Ok(res),
            status => Err(ProbeError::UnexpectedStatus { status, url }),
        }
    }

    /// Run the token exchange described by `challenge` and keep the issued
    /// token for every later request.
    pub(crate) fn authenticate(&mut self, challenge: &BearerChallenge) -> Result<()> {
        debug!(
            realm = %challenge.realm,
            service = %challenge.service,
            scope = %challenge.scope,
            "Making authentication call"
        );
        let res = self
            .client
            .get(challenge.realm.as_str())
            .query(&[
                ("service", challenge.service.as_str()),
                ("scope", challenge.scope.as_str()),
            ])
            .apply_authentication(&self.auth)
            .send()?;

        let status = res.status();
        if status != StatusCode::OK {
            debug!(%status, "Failed to authenticate for {}", self.reference);
            return Err(ProbeError::LoginFailed(status));
        }

        let token = RegistryToken::from_reader(res)?;
        debug!("Successfully authorized for {}", self.reference);
        self.tokens.insert(token);
        Ok(())
    }

    fn registry_request(&self, method: Method, url: &str, accept: &[&str]) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, accept.join(", "))
            .apply_authorization(&self.auth, self.tokens.get())
    }

    /// Convert a tag to a v2 manifest URL.
    fn to_v2_manifest_url(&self, tag: &str) -> String {
        format!(
            "{}://{}/v2/{}/manifests/{}",
            self.protocol.scheme_for(self.reference.registry()),
            self.reference.registry(),
            self.reference.repository(),
            tag,
        )
    }

    /// Convert a digest to a v2 blob URL.
    fn to_v2_blob_url(&self, digest: &str) -> String {
        format!(
            "{}://{}/v2/{}/blobs/{}",
            self.protocol.scheme_for(self.reference.registry()),
            self.reference.registry(),
            self.reference.repository(),
            digest,
        )
    }
}

impl ImageConfigSource for Client {
    fn image_config(&self, digest: &str) -> Result<ImageConfiguration> {
        let res = self.fetch_config(digest)?;
        serde_json::from_reader(res).map_err(ProbeError::decode(Document::ImageConfig))
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::blocking::Client> {
    let mut client_builder = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certificates);

    #[cfg(feature = "native-tls")]
    {
        client_builder = client_builder.danger_accept_invalid_hostnames(config.accept_invalid_hostnames);
    }

    for c in &config.extra_root_certificates {
        let cert = match c.encoding {
            CertificateEncoding::Der => reqwest::Certificate::from_der(c.data.as_slice())?,
            CertificateEncoding::Pem => reqwest::Certificate::from_pem(c.data.as_slice())?,
        };
        client_builder = client_builder.add_root_certificate(cert);
    }

    if let Some(timeout) = config.timeout {
        client_builder = client_builder.timeout(timeout);
    }

    if !config.use_system_proxy {
        client_builder = client_builder.no_proxy();
    }

    Ok(client_builder.build()?)
}

/// The encoding of the certificate
#[derive(Debug, Clone)]
pub enum CertificateEncoding {
    #[allow(missing_docs)]
    Der,
    #[allow(missing_docs)]
    Pem,
}

/// A x509 certificate
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Which encoding is used by the certificate
    pub encoding: CertificateEncoding,

    /// Actual certificate
    pub data: Vec<u8>,
}

/// A client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Which protocol the client should use
    pub protocol: ClientProtocol,

    /// Accept invalid hostname. Defaults to false
    #[cfg(feature = "native-tls")]
    pub accept_invalid_hostnames: bool,

    /// Accept invalid certificates. Defaults to false
    pub accept_invalid_certificates: bool,

    /// A list of extra root certificate to trust. This can be used to connect
    /// to servers using self-signed certificates
    pub extra_root_certificates: Vec<Certificate>,

    /// Total timeout of every request, token requests included. When unset
    /// the transport default applies.
    pub timeout: Option<Duration>,

    /// Honor the `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` environment. Defaults
    /// to true
    pub use_system_proxy: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: ClientProtocol::default(),
            #[cfg(feature = "native-tls")]
            accept_invalid_hostnames: false,
            accept_invalid_certificates: false,
            extra_root_certificates: Vec::new(),
            timeout: None,
            use_system_proxy: true,
        }
    }
}

/// The protocol that the client should use to connect
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientProtocol {
    #[allow(missing_docs)]
    Http,
    #[allow(missing_docs)]
    #[default]
    Https,
    #[allow(missing_docs)]
    HttpsExcept(Vec<String>),
}

impl ClientProtocol {
    fn scheme_for(&self, registry: &str) -> &str {
        match self {
            ClientProtocol::Https => "https",
            ClientProtocol::Http => "http",
            ClientProtocol::HttpsExcept(exceptions) => {
                if exceptions.iter().any(|e| e == registry) {
                    "http"
                } else {
                    "https"
                }
            }
        }
    }
}

/// The parameters of a `WWW-Authenticate: Bearer` challenge. Missing
/// parameters are empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BearerChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

impl BearerChallenge {
    /// Parse a challenge, returning `None` unless it uses the Bearer scheme
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let params = header.trim_start().strip_prefix("Bearer ")?;
        let mut challenge = BearerChallenge::default();
        for caps in AUTH_PARAM.captures_iter(params) {
            let value = caps[2].to_string();
            match &caps[1] {
                "realm" => challenge.realm = value,
                "service" => challenge.service = value,
                "scope" => challenge.scope = value,
                _ => {}
            }
        }
        Some(challenge)
    }

    /// The challenge of a 401 response, if it carries a Bearer one
    pub(crate) fn from_response(res: &Response) -> Option<Self> {
        res.headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| BearerChallenge::try_from(h).ok())
    }
}

impl TryFrom<&HeaderValue> for BearerChallenge {
    type Error = String;

    fn try_from(value: &HeaderValue) -> std::result::Result<Self, Self::Error> {
        let header = value
            .to_str()
            .map_err(|e| format!("cannot convert header value to string: {:?}", e))?;
        BearerChallenge::parse(header).ok_or_else(|| "Cannot find Bearer challenge".to_string())
    }
}
