use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, trace};

use crate::client::{BearerChallenge, Client, ClientConfig};
use crate::errors::{ProbeError, Result};
use crate::manifest::parse_content_type;
use crate::platform;
use crate::reference::Reference;
use crate::secrets::RegistryAuth;

/// Requests per operation: the first one, and one retry after a login.
const MAX_ATTEMPTS: usize = 2;

/// A repository on a Docker Registry v2 host.
///
/// The handle keeps the bearer token obtained on the first challenge and
/// sends it with every later request, until the handle is dropped. Probes
/// take `&mut self` since they may replace that token; use one handle per
/// concurrent check.
///
/// ```no_run
/// use registry_probe::{ProbeError, Repository};
///
/// let mut repo = Repository::new("nginx", "", "");
/// assert!(repo.has_image("latest")?);
/// match repo.has_platform_image("latest", "arm64", "linux") {
///     Ok(()) => println!("available"),
///     Err(ProbeError::DeprecatedManifest) => println!("schema v1 image"),
///     Err(e) => return Err(e),
/// }
/// # Ok::<(), ProbeError>(())
/// ```
pub struct Repository {
    client: Client,
}

impl Repository {
    /// Create a handle for `image` with the default client configuration.
    /// `username` and `password` may both be empty for anonymous access.
    pub fn new(image: &str, username: &str, password: &str) -> Self {
        Self::with_config(image, username, password, ClientConfig::default())
    }

    /// Create a handle with the supplied config. If the configured HTTP
    /// client cannot be built, a default one is used instead.
    pub fn with_config(image: &str, username: &str, password: &str, config: ClientConfig) -> Self {
        Repository {
            client: Client::new(
                Reference::new(image),
                RegistryAuth::new(username, password),
                config,
            ),
        }
    }

    /// Create a handle with the supplied config, failing if the configured
    /// HTTP client cannot be built.
    pub fn try_with_config(
        image: &str,
        username: &str,
        password: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        Self::with_auth(
            Reference::new(image),
            RegistryAuth::new(username, password),
            config,
        )
    }

    /// Create a handle from an already resolved reference and auth method.
    pub fn with_auth(reference: Reference, auth: RegistryAuth, config: ClientConfig) -> Result<Self> {
        Ok(Repository {
            client: Client::try_new(reference, auth, config)?,
        })
    }

    /// The resolved registry host and repository path
    pub fn reference(&self) -> &Reference {
        self.client.reference()
    }

    /// The bearer token obtained by this handle, if any
    pub fn token(&self) -> Option<&str> {
        self.client.token()
    }

    /// Check whether `tag` exists in the repository.
    ///
    /// Answers `Ok(true)` when the registry has the manifest. Any other
    /// answer, a 404 included, is reported as an error carrying the status.
    pub fn has_image(&mut self, tag: &str) -> Result<bool> {
        debug!(reference = %self.client.reference(), tag, "Checking image availability");
        self.negotiate(tag, Client::probe_tag)?;
        Ok(true)
    }

    /// Check whether `tag` provides an image for `architecture`/`os`.
    ///
    /// An empty `architecture` or `os` matches any value. `Ok(())` means an
    /// image is available; [`ProbeError::DeprecatedManifest`] means the tag
    /// is a schema v1 manifest whose platform cannot be told; every other
    /// error means no image was found or the check failed.
    pub fn has_platform_image(&mut self, tag: &str, architecture: &str, os: &str) -> Result<()> {
        debug!(reference = %self.client.reference(), tag, architecture, os, "Checking platform availability");
        let res = self.negotiate(tag, Client::fetch_manifest)?;
        let media_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(parse_content_type)
            .unwrap_or_default()
            .to_string();
        debug!(%media_type, "Got manifest");

        platform::resolve(&self.client, &media_type, res, architecture, os)
    }

    /// Send a manifest request, answering at most one Bearer challenge.
    fn negotiate(
        &mut self,
        tag: &str,
        send: fn(&Client, &str) -> Result<Response>,
    ) -> Result<Response> {
        let mut attempts = MAX_ATTEMPTS;
        while attempts > 0 {
            attempts -= 1;
            let res = send(&self.client, tag)?;
            let status = res.status();
            trace!(%status, attempts, "Registry answered");
            match status {
                StatusCode::OK => return Ok(res),
                StatusCode::UNAUTHORIZED if attempts > 0 => {
                    let challenge = match BearerChallenge::from_response(&res) {
                        Some(challenge) => challenge,
                        None => return Err(unexpected_status(&res)),
                    };
                    drop(res);
                    self.client.authenticate(&challenge)?;
                }
                _ => return Err(unexpected_status(&res)),
            }
        }
        Err(ProbeError::Aborted)
    }
}

fn unexpected_status(res: &Response) -> ProbeError {
    ProbeError::UnexpectedStatus {
        status: res.status(),
        url: res.url().to_string(),
    }
}
