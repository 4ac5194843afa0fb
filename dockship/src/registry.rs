use std::fmt;

use clap::ValueEnum;

#[derive(Debug, Default, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Registry {
    /// GitHub Container Registry, images are referenced as `ghcr.io/<account>/<name>`.
    #[default]
    Ghcr,

    /// Docker Hub, images are referenced as `<account>/<name>`.
    DockerHub,
}

impl Registry {
    /// The host passed to `docker login`.
    pub const fn host(&self) -> &'static str {
        match self {
            Registry::Ghcr => "ghcr.io",
            Registry::DockerHub => "docker.io",
        }
    }

    /// Whether image references carry the host. Docker Hub is the implicit default registry of
    /// the container tooling.
    const fn qualify_with_host(&self) -> bool {
        match self {
            Registry::Ghcr => true,
            Registry::DockerHub => false,
        }
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Registry::Ghcr => "GHCR",
            Registry::DockerHub => "Docker Hub",
        })
    }
}

/// Where an image goes. Computed once, before anything talks to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub registry: Registry,
    pub host: &'static str,
    pub account: String,
    pub reference: String,
}

impl ResolvedTarget {
    pub fn new(registry: Registry, account: &str, image_name: &str) -> Self {
        let host = registry.host();
        // Registries reject upper case repository paths, the account is only used verbatim as the
        // login user.
        let path_account = account.to_ascii_lowercase();
        let reference = if registry.qualify_with_host() {
            format!("{host}/{path_account}/{image_name}")
        } else {
            format!("{path_account}/{image_name}")
        };
        Self {
            registry,
            host,
            account: account.to_owned(),
            reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghcr_reference_includes_host() {
        let target = ResolvedTarget::new(Registry::Ghcr, "alice", "my-app");
        assert_eq!(target.host, "ghcr.io");
        assert_eq!(target.reference, "ghcr.io/alice/my-app");
    }

    #[test]
    fn docker_hub_reference_omits_host() {
        let target = ResolvedTarget::new(Registry::DockerHub, "alice", "my-app");
        assert_eq!(target.host, "docker.io");
        assert_eq!(target.reference, "alice/my-app");
    }

    #[test]
    fn account_is_lowercased_in_reference_only() {
        let target = ResolvedTarget::new(Registry::Ghcr, "Alice", "my-app");
        assert_eq!(target.account, "Alice");
        assert_eq!(target.reference, "ghcr.io/alice/my-app");
    }
}
