use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The registry host serving Docker Hub repositories
pub const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";

/// Namespace of Docker Hub's official images
const OFFICIAL_NAMESPACE: &str = "library/";

/// Reference to a repository on a Docker Registry v2 host.
///
/// An image name is resolved the way the Docker CLI does it: the first path
/// component is a registry host only when it looks like a domain (it contains
/// a `.`) and is followed by at least one more component. Every other name
/// lives on Docker Hub, and single component names belong to the `library/`
/// namespace.
///
/// ```
/// use registry_probe::Reference;
///
/// let r = Reference::new("nginx");
/// assert_eq!(r.registry(), "registry-1.docker.io");
/// assert_eq!(r.repository(), "library/nginx");
///
/// let r = Reference::new("registry.example.com/team/app");
/// assert_eq!(r.registry(), "registry.example.com");
/// assert_eq!(r.repository(), "team/app");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    registry: String,
    repository: String,
}

impl Reference {
    /// Resolve an image name. This never fails: anything that does not name a
    /// registry host is taken as a Docker Hub repository.
    pub fn new(image: &str) -> Self {
        if let Some((host, repository)) = image.split_once('/') {
            if host.contains('.') {
                return Reference {
                    registry: host.to_string(),
                    repository: repository.to_string(),
                };
            }
        }

        let repository = if image.contains('/') {
            image.to_string()
        } else {
            format!("{OFFICIAL_NAMESPACE}{image}")
        };
        Reference {
            registry: DOCKER_HUB_REGISTRY.to_string(),
            repository,
        }
    }

    /// The registry host, including the port when one was given
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// The repository path on the registry
    pub fn repository(&self) -> &str {
        &self.repository
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}

impl FromStr for Reference {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Reference::new(s))
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Reference::new(s)
    }
}
