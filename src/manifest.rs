//! Manifest and image configuration documents, and the media types that
//! identify them.
//!
//! Only the fields needed to decide platform availability are modeled; every
//! other field of the upstream schemas is ignored while decoding.

use serde::{Deserialize, Serialize};

/// The mediatype for an OCI image index
pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
/// The mediatype for a Docker v2 schema 2 manifest list
pub const IMAGE_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// The mediatype for an OCI image manifest
pub const OCI_IMAGE_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
/// The mediatype for a Docker v2 schema 2 manifest
pub const IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// The mediatype for an OCI image configuration
pub const IMAGE_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
/// The mediatype for a Docker image configuration
pub const IMAGE_DOCKER_CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
/// The mediatype for a signed Docker v2 schema 1 manifest
pub const IMAGE_MANIFEST_V1_SIGNED_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
/// The mediatype for an unsigned Docker v2 schema 1 manifest
pub const IMAGE_MANIFEST_V1_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v1+json";

/// Manifest media types offered to the registry, in order of preference
pub(crate) const MIME_TYPES_DISTRIBUTION_MANIFEST: &[&str] = &[
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    IMAGE_MANIFEST_LIST_MEDIA_TYPE,
    OCI_IMAGE_MEDIA_TYPE,
    IMAGE_MANIFEST_MEDIA_TYPE,
];

/// Image configuration media types offered to the registry
pub(crate) const MIME_TYPES_IMAGE_CONFIG: &[&str] =
    &[IMAGE_CONFIG_MEDIA_TYPE, IMAGE_DOCKER_CONFIG_MEDIA_TYPE];

/// The family of a manifest, as told by its media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestKind {
    /// OCI image index or Docker manifest list
    Index,
    /// OCI image manifest or Docker schema 2 manifest
    Image,
    /// Docker schema 1 manifest, signed or not
    Legacy,
    /// Anything else
    Unknown(String),
}

impl ManifestKind {
    /// Classify a media type. Parameters must already be stripped.
    pub fn from_media_type(media_type: &str) -> Self {
        match media_type {
            OCI_IMAGE_INDEX_MEDIA_TYPE | IMAGE_MANIFEST_LIST_MEDIA_TYPE => ManifestKind::Index,
            OCI_IMAGE_MEDIA_TYPE | IMAGE_MANIFEST_MEDIA_TYPE => ManifestKind::Image,
            IMAGE_MANIFEST_V1_SIGNED_MEDIA_TYPE | IMAGE_MANIFEST_V1_MEDIA_TYPE => {
                ManifestKind::Legacy
            }
            other => ManifestKind::Unknown(other.to_string()),
        }
    }
}

/// Strip the parameters (`; charset=...`) off a `Content-Type` value
pub fn parse_content_type(content_type: &str) -> &str {
    match content_type.split_once(';') {
        Some((media_type, _)) => media_type.trim(),
        None => content_type.trim(),
    }
}

/// The platform an image is built for.
///
/// Only `architecture` and `os` take part in matching.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Platform {
    /// CPU architecture, using Go's `GOARCH` values (`amd64`, `arm64`, ...)
    #[serde(default)]
    pub architecture: String,
    /// Operating system, using Go's `GOOS` values (`linux`, `windows`, ...)
    #[serde(default)]
    pub os: String,
    /// CPU variant, such as `v7` for `arm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Build a platform from its architecture and operating system
    pub fn new(architecture: impl Into<String>, os: impl Into<String>) -> Self {
        Platform {
            architecture: architecture.into(),
            os: os.into(),
            variant: None,
        }
    }

    /// Whether this platform satisfies the requested one. An empty requested
    /// value matches anything.
    pub fn satisfies(&self, architecture: &str, os: &str) -> bool {
        field_matches(architecture, &self.architecture) && field_matches(os, &self.os)
    }
}

fn field_matches(want: &str, got: &str) -> bool {
    want.is_empty() || want == got
}

/// A content descriptor, pointing at a manifest or a blob
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The media type of the referenced content
    #[serde(default)]
    pub media_type: String,
    /// The digest of the referenced content
    pub digest: String,
    /// The size in bytes of the referenced content
    #[serde(default)]
    pub size: i64,
    /// The platform the referenced content runs on, when declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// An OCI image index or Docker manifest list
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version, always 2
    #[serde(default)]
    pub schema_version: u8,
    /// The media type of this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Per-platform manifests, in the order the registry lists them
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

/// An OCI image manifest or Docker schema 2 manifest
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version, always 2
    #[serde(default)]
    pub schema_version: u8,
    /// The media type of this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// The image configuration blob
    pub config: Descriptor,
    /// The layers of the image
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// The subset of an image configuration that describes its platform
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageConfiguration {
    /// CPU architecture of the image binaries
    #[serde(default)]
    pub architecture: String,
    /// Operating system of the image binaries
    #[serde(default)]
    pub os: String,
    /// CPU variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl ImageConfiguration {
    /// The platform described by this configuration
    pub fn platform(&self) -> Platform {
        Platform {
            architecture: self.architecture.clone(),
            os: self.os.clone(),
            variant: self.variant.clone(),
        }
    }
}
