//! Errors related to probing a registry

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// The document that could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    /// An OCI image index or a Docker manifest list
    ManifestList,
    /// A single image manifest
    Manifest,
    /// An image configuration blob
    ImageConfig,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::ManifestList => f.write_str("manifest list"),
            Document::Manifest => f.write_str("manifest"),
            Document::ImageConfig => f.write_str("image config"),
        }
    }
}

/// Errors that can be raised while probing a repository
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The HTTP request could not be completed
    #[error("Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// The registry answered with a status the operation does not handle
    #[error("{status} returned by {url}")]
    UnexpectedStatus {
        /// The HTTP status returned by the registry
        status: StatusCode,
        /// The url that was requested
        url: String,
    },
    /// The token service refused to issue a token
    #[error("login failed {0}")]
    LoginFailed(StatusCode),
    /// The token service answered without a usable token
    #[error("response does not contain token")]
    MissingToken,
    /// The token service answer could not be decoded
    #[error("Failed to decode registry token: {0}")]
    TokenDecodeError(#[source] serde_json::Error),
    /// A manifest, manifest list or image config could not be decoded
    #[error("{document} decode error: {source}")]
    DecodeError {
        /// Which document failed to decode
        document: Document,
        /// The underlying decoder error
        #[source]
        source: serde_json::Error,
    },
    /// The tag points at a schema v1 manifest, which carries no platform data
    #[error("deprecated manifest")]
    DeprecatedManifest,
    /// The registry negotiated a media type that is not a manifest family
    #[error("unknown MediaType {0}")]
    UnknownMediaType(String),
    /// No image in the repository satisfies the requested platform
    #[error("no image for {architecture}/{os}")]
    PlatformNotFound {
        /// Requested architecture
        architecture: String,
        /// Requested operating system
        os: String,
    },
    /// Every attempt was consumed without a definite answer
    #[error("aborted")]
    Aborted,
}

impl ProbeError {
    pub(crate) fn decode(document: Document) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| ProbeError::DecodeError { document, source }
    }

    /// Returns the HTTP status carried by this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProbeError::UnexpectedStatus { status, .. } | ProbeError::LoginFailed(status) => {
                Some(*status)
            }
            ProbeError::RequestError(e) => e.status(),
            _ => None,
        }
    }
}

/// Helper type to declare `Result` objects that might return a `ProbeError`
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_not_found_names_the_platform() {
        let err = ProbeError::PlatformNotFound {
            architecture: "arm64".to_string(),
            os: "linux".to_string(),
        };
        assert_eq!(err.to_string(), "no image for arm64/linux");
    }

    #[test]
    fn decode_error_names_the_document() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProbeError::decode(Document::ImageConfig)(source);
        assert!(err.to_string().starts_with("image config decode error: "));
        assert!(matches!(
            err,
            ProbeError::DecodeError {
                document: Document::ImageConfig,
                ..
            }
        ));
    }

    #[test]
    fn status_is_exposed() {
        let err = ProbeError::UnexpectedStatus {
            status: StatusCode::NOT_FOUND,
            url: "https://example.com/v2/foo/manifests/latest".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            ProbeError::LoginFailed(StatusCode::FORBIDDEN).to_string(),
            "login failed 403 Forbidden"
        );
        assert_eq!(ProbeError::DeprecatedManifest.status(), None);
    }
}
