//! Platform availability decisions over the manifest families.

use std::io::Read;

use tracing::debug;

use crate::errors::{Document, ProbeError, Result};
use crate::manifest::{ImageConfiguration, ImageIndex, ImageManifest, ManifestKind};

/// Source of image configuration blobs, consulted when a single manifest
/// does not declare its platform.
pub(crate) trait ImageConfigSource {
    fn image_config(&self, digest: &str) -> Result<ImageConfiguration>;
}

/// Decide whether the manifest in `body` provides an image for
/// `architecture`/`os`. Empty requested values match anything.
pub(crate) fn resolve(
    source: &impl ImageConfigSource,
    media_type: &str,
    body: impl Read,
    architecture: &str,
    os: &str,
) -> Result<()> {
    let found = match ManifestKind::from_media_type(media_type) {
        ManifestKind::Index => {
            let index: ImageIndex =
                serde_json::from_reader(body).map_err(ProbeError::decode(Document::ManifestList))?;
            index_provides(&index, architecture, os)
        }
        ManifestKind::Image => {
            let manifest: ImageManifest =
                serde_json::from_reader(body).map_err(ProbeError::decode(Document::Manifest))?;
            manifest_provides(source, &manifest, architecture, os)?
        }
        ManifestKind::Legacy => return Err(ProbeError::DeprecatedManifest),
        ManifestKind::Unknown(media_type) => return Err(ProbeError::UnknownMediaType(media_type)),
    };

    if found {
        Ok(())
    } else {
        Err(ProbeError::PlatformNotFound {
            architecture: architecture.to_string(),
            os: os.to_string(),
        })
    }
}

/// The first descriptor without a platform makes the whole index
/// platform-agnostic, even if earlier descriptors did not match.
fn index_provides(index: &ImageIndex, architecture: &str, os: &str) -> bool {
    for descriptor in &index.manifests {
        match &descriptor.platform {
            None => {
                debug!(digest = %descriptor.digest, "Descriptor without platform, image is not platform specific");
                return true;
            }
            Some(platform) if platform.satisfies(architecture, os) => {
                debug!(digest = %descriptor.digest, ?platform, "Matching descriptor");
                return true;
            }
            Some(_) => {}
        }
    }
    false
}

fn manifest_provides(
    source: &impl ImageConfigSource,
    manifest: &ImageManifest,
    architecture: &str,
    os: &str,
) -> Result<bool> {
    if let Some(platform) = &manifest.config.platform {
        if platform.satisfies(architecture, os) {
            debug!(?platform, "Manifest declares a matching platform");
            return Ok(true);
        }
    }

    debug!(digest = %manifest.config.digest, "Falling back to the image config");
    let config = source.image_config(&manifest.config.digest)?;
    Ok(config.platform().satisfies(architecture, os))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::manifest::{
        Descriptor, Platform, IMAGE_MANIFEST_LIST_MEDIA_TYPE, IMAGE_MANIFEST_MEDIA_TYPE,
        IMAGE_MANIFEST_V1_MEDIA_TYPE, IMAGE_MANIFEST_V1_SIGNED_MEDIA_TYPE,
        OCI_IMAGE_INDEX_MEDIA_TYPE, OCI_IMAGE_MEDIA_TYPE,
    };
    use rstest::rstest;
    use std::cell::Cell;

    const CONFIG_DIGEST: &str = "sha256:c0ffee";

    /// Serves a single configuration and counts how often it was asked for.
    struct StubConfig {
        config: Option<ImageConfiguration>,
        calls: Cell<usize>,
    }

    impl StubConfig {
        fn new(architecture: &str, os: &str) -> Self {
            StubConfig {
                config: Some(ImageConfiguration {
                    architecture: architecture.to_string(),
                    os: os.to_string(),
                    variant: None,
                }),
                calls: Cell::new(0),
            }
        }

        fn unused() -> Self {
            StubConfig {
                config: None,
                calls: Cell::new(0),
            }
        }
    }

    impl ImageConfigSource for StubConfig {
        fn image_config(&self, digest: &str) -> Result<ImageConfiguration> {
            self.calls.set(self.calls.get() + 1);
            assert_eq!(digest, CONFIG_DIGEST);
            match &self.config {
                Some(config) => Ok(config.clone()),
                None => panic!("image config should not be fetched"),
            }
        }
    }

    fn descriptor(platform: Option<Platform>) -> Descriptor {
        Descriptor {
            media_type: IMAGE_MANIFEST_MEDIA_TYPE.to_string(),
            digest: "sha256:abcd".to_string(),
            size: 528,
            platform,
        }
    }

    fn index(platforms: Vec<Option<Platform>>) -> Vec<u8> {
        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(OCI_IMAGE_INDEX_MEDIA_TYPE.to_string()),
            manifests: platforms.into_iter().map(descriptor).collect(),
        };
        serde_json::to_vec(&index).unwrap()
    }

    fn manifest(platform: Option<Platform>) -> Vec<u8> {
        let manifest = ImageManifest {
            schema_version: 2,
            media_type: Some(OCI_IMAGE_MEDIA_TYPE.to_string()),
            config: Descriptor {
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                digest: CONFIG_DIGEST.to_string(),
                size: 1470,
                platform,
            },
            layers: Vec::new(),
        };
        serde_json::to_vec(&manifest).unwrap()
    }

    #[rstest]
    #[case(OCI_IMAGE_INDEX_MEDIA_TYPE)]
    #[case(IMAGE_MANIFEST_LIST_MEDIA_TYPE)]
    fn index_match(#[case] media_type: &str) {
        let body = index(vec![
            Some(Platform::new("amd64", "linux")),
            Some(Platform::new("arm64", "linux")),
        ]);
        let source = StubConfig::unused();
        resolve(&source, media_type, body.as_slice(), "arm64", "linux").unwrap();
        assert_eq!(source.calls.get(), 0);
    }

    #[rstest]
    #[case("arm64", "linux")]
    #[case("s390x", "windows")]
    #[case("", "")]
    fn index_without_platform_matches_anything(#[case] arch: &str, #[case] os: &str) {
        let body = index(vec![None, Some(Platform::new("amd64", "linux"))]);
        resolve(&StubConfig::unused(), OCI_IMAGE_INDEX_MEDIA_TYPE, body.as_slice(), arch, os)
            .unwrap();
    }

    #[test]
    fn index_descriptor_without_platform_short_circuits_later() {
        let body = index(vec![Some(Platform::new("amd64", "linux")), None]);
        resolve(
            &StubConfig::unused(),
            OCI_IMAGE_INDEX_MEDIA_TYPE,
            body.as_slice(),
            "riscv64",
            "linux",
        )
        .unwrap();
    }

    #[test]
    fn index_without_match() {
        let body = index(vec![
            Some(Platform::new("amd64", "linux")),
            Some(Platform::new("amd64", "windows")),
        ]);
        let err = resolve(
            &StubConfig::unused(),
            IMAGE_MANIFEST_LIST_MEDIA_TYPE,
            body.as_slice(),
            "arm64",
            "linux",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "no image for arm64/linux");
    }

    #[test]
    fn empty_index_has_no_image() {
        let body = index(Vec::new());
        let err = resolve(
            &StubConfig::unused(),
            OCI_IMAGE_INDEX_MEDIA_TYPE,
            body.as_slice(),
            "amd64",
            "linux",
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::PlatformNotFound { .. }));
    }

    #[test]
    fn wildcard_os_in_index() {
        let body = index(vec![Some(Platform::new("amd64", "windows"))]);
        resolve(
            &StubConfig::unused(),
            OCI_IMAGE_INDEX_MEDIA_TYPE,
            body.as_slice(),
            "amd64",
            "",
        )
        .unwrap();
    }

    #[test]
    fn manifest_platform_match_skips_config() {
        let body = manifest(Some(Platform::new("arm64", "linux")));
        let source = StubConfig::unused();
        resolve(&source, OCI_IMAGE_MEDIA_TYPE, body.as_slice(), "arm64", "linux").unwrap();
        assert_eq!(source.calls.get(), 0);
    }

    // Requested architecture is compared with the declared architecture and
    // requested os with the declared os, never crosswise.
    #[test]
    fn manifest_platform_compares_like_for_like() {
        let body = manifest(Some(Platform::new("amd64", "linux")));
        let source = StubConfig::new("amd64", "linux");
        let err = resolve(&source, OCI_IMAGE_MEDIA_TYPE, body.as_slice(), "linux", "amd64")
            .unwrap_err();
        assert!(matches!(err, ProbeError::PlatformNotFound { .. }));
        // the mismatch falls through to the config, which does not match either
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn manifest_falls_back_to_config() {
        let body = manifest(None);
        let source = StubConfig::new("arm64", "linux");
        resolve(&source, IMAGE_MANIFEST_MEDIA_TYPE, body.as_slice(), "arm64", "linux").unwrap();
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn mismatching_manifest_platform_falls_back_to_config() {
        let body = manifest(Some(Platform::new("amd64", "linux")));
        let source = StubConfig::new("arm64", "linux");
        resolve(&source, OCI_IMAGE_MEDIA_TYPE, body.as_slice(), "arm64", "linux").unwrap();
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn config_without_match() {
        let body = manifest(None);
        let source = StubConfig::new("amd64", "linux");
        let err = resolve(&source, OCI_IMAGE_MEDIA_TYPE, body.as_slice(), "arm64", "linux")
            .unwrap_err();
        assert_eq!(err.to_string(), "no image for arm64/linux");
    }

    #[rstest]
    #[case(IMAGE_MANIFEST_V1_SIGNED_MEDIA_TYPE, "amd64", "linux")]
    #[case(IMAGE_MANIFEST_V1_MEDIA_TYPE, "", "")]
    fn legacy_is_deprecated(#[case] media_type: &str, #[case] arch: &str, #[case] os: &str) {
        // the body is never decoded
        let err = resolve(&StubConfig::unused(), media_type, &b"not json"[..], arch, os)
            .unwrap_err();
        assert!(matches!(err, ProbeError::DeprecatedManifest));
    }

    #[test]
    fn unknown_media_type() {
        let err = resolve(
            &StubConfig::unused(),
            "text/html",
            &b"<html></html>"[..],
            "amd64",
            "linux",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown MediaType text/html");
    }

    #[rstest]
    #[case(OCI_IMAGE_INDEX_MEDIA_TYPE, Document::ManifestList)]
    #[case(IMAGE_MANIFEST_MEDIA_TYPE, Document::Manifest)]
    fn decode_errors_name_the_document(#[case] media_type: &str, #[case] expected: Document) {
        let err = resolve(&StubConfig::unused(), media_type, &b"{"[..], "amd64", "linux")
            .unwrap_err();
        match err {
            ProbeError::DecodeError { document, .. } => assert_eq!(document, expected),
            other => panic!("unexpected error: {other}"),
        }
    }
}
