//! Standard filesystem paths for Strata.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory the proxied driver operates under.
pub static STRATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STRATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/strata"))
});

/// Default runtime directory for sockets.
pub static STRATA_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("STRATA_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/strata"))
});

/// Standard paths used by the proxy daemon.
#[derive(Debug, Clone)]
pub struct StrataPaths {
    /// Root data directory (default: /var/lib/strata).
    pub root: PathBuf,
    /// Runtime directory (default: /run/strata).
    pub runtime: PathBuf,
}

impl StrataPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runtime = root.join("run");
        Self { root, runtime }
    }

    /// Unix socket the daemon listens on by default.
    #[must_use]
    pub fn socket(&self) -> PathBuf {
        self.runtime.join("strata.sock")
    }
}

impl Default for StrataPaths {
    fn default() -> Self {
        Self {
            root: STRATA_ROOT.clone(),
            runtime: STRATA_RUNTIME_DIR.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = StrataPaths::with_root("/tmp/strata-test");
        assert_eq!(paths.runtime, PathBuf::from("/tmp/strata-test/run"));
        assert_eq!(
            paths.socket(),
            PathBuf::from("/tmp/strata-test/run/strata.sock")
        );
    }
}
