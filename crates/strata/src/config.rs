//! Proxy configuration.

use std::path::PathBuf;

use strata_common::{StrataError, StrataPaths, StrataResult};

use crate::bridge::{MOUNT_HELPER, UMOUNT_HELPER};

/// Label prefix that carries the target container name.
pub const CONTAINER_LABEL: &str = "ctname=";

/// Proxy configuration options, fixed for the lifetime of the service.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Paths for proxy data; `paths.root` is the root every mount must live under.
    pub paths: StrataPaths,
    /// Container whose mount namespace receives bridged layers.
    pub container_name: String,
    /// Namespace mount helper program.
    pub mount_helper: String,
    /// Namespace unmount helper program.
    pub umount_helper: String,
}

impl ProxyConfig {
    /// Configuration for `container_name` with default paths and helpers.
    pub fn new(container_name: impl Into<String>) -> Self {
        Self {
            paths: StrataPaths::new(),
            container_name: container_name.into(),
            mount_helper: MOUNT_HELPER.to_string(),
            umount_helper: UMOUNT_HELPER.to_string(),
        }
    }

    /// Build a configuration from daemon labels.
    ///
    /// The container name is the first `ctname=` label.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] when no label names a container.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> StrataResult<Self> {
        let name = labels
            .iter()
            .find_map(|label| label.as_ref().strip_prefix(CONTAINER_LABEL))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StrataError::Config {
                message: format!("no {CONTAINER_LABEL}<name> label given"),
            })?;

        Ok(Self::new(name))
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = StrataPaths::with_root(root);
        self
    }

    /// Use custom namespace helpers.
    #[must_use]
    pub fn with_helpers(mut self, mount: impl Into<String>, umount: impl Into<String>) -> Self {
        self.mount_helper = mount.into();
        self.umount_helper = umount.into();
        self
    }

    /// The proxy root.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.paths.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_from_labels() {
        let config = ProxyConfig::from_labels(&["env=prod", "ctname=ctA"]).unwrap();
        assert_eq!(config.container_name, "ctA");
        assert_eq!(config.mount_helper, "dock-mount");
        assert_eq!(config.umount_helper, "dock-umount");
    }

    #[test]
    fn missing_container_label() {
        assert!(ProxyConfig::from_labels(&["env=prod"]).is_err());
        assert!(ProxyConfig::from_labels(&["ctname="]).is_err());
        assert!(ProxyConfig::from_labels::<&str>(&[]).is_err());
    }

    #[test]
    fn builder_pattern() {
        let config = ProxyConfig::new("ctA")
            .with_root("/data")
            .with_helpers("/bin/true", "/bin/false");

        assert_eq!(config.root(), std::path::Path::new("/data"));
        assert_eq!(config.mount_helper, "/bin/true");
        assert_eq!(config.umount_helper, "/bin/false");
    }
}
