//! Storage driver capability interface and backend registry.
//!
//! A [`GraphDriver`] manages copy-on-write layers under a home directory.
//! The proxy never looks inside a driver; it only consumes this trait.
//! Backends are looked up by name in a [`DriverRegistry`] when the proxy
//! receives `Init`.

mod local;
mod overlay;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_common::{DriverOptions, StrataError, StrataResult};

pub use local::LocalDriver;
pub use overlay::{OverlayDriver, OverlayMount};

/// Layer lifecycle operations implemented by a storage backend.
///
/// Drivers are shared across request handlers, so every method takes
/// `&self`; mount reference counts live behind interior mutability.
pub trait GraphDriver: Send + Sync {
    /// Registered name of this backend.
    fn name(&self) -> &str;

    /// Diagnostic key/value pairs, in display order.
    fn status(&self) -> Vec<(String, String)>;

    /// Create layer `id` on top of `parent` (empty for a base layer).
    fn create(&self, id: &str, parent: &str) -> StrataResult<()>;

    /// Remove layer `id`. Fails while the layer is mounted.
    fn remove(&self, id: &str) -> StrataResult<()>;

    /// Mount layer `id` and return the absolute path of its root.
    fn get(&self, id: &str, mount_label: &str) -> StrataResult<PathBuf>;

    /// Release one mount reference taken by [`GraphDriver::get`].
    fn put(&self, id: &str) -> StrataResult<()>;

    /// Whether layer `id` exists.
    fn exists(&self, id: &str) -> bool;

    /// Best-effort teardown of everything the driver holds.
    fn cleanup(&self) -> StrataResult<()>;

    /// Backend-specific facts about layer `id`.
    fn metadata(&self, id: &str) -> StrataResult<HashMap<String, String>>;
}

/// Constructor for a driver rooted at a home directory.
pub type DriverFactory =
    Arc<dyn Fn(&Path, &DriverOptions) -> StrataResult<Box<dyn GraphDriver>> + Send + Sync>;

/// Name-keyed table of driver constructors.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled `local` and `overlay` backends.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(LocalDriver::NAME, |home, options| {
            Ok(Box::new(LocalDriver::new(home, options)?) as Box<dyn GraphDriver>)
        });
        registry.register(OverlayDriver::NAME, |home, options| {
            Ok(Box::new(OverlayDriver::new(home, options)?) as Box<dyn GraphDriver>)
        });
        registry
    }

    /// Register (or replace) a backend.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Path, &DriverOptions) -> StrataResult<Box<dyn GraphDriver>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct backend `name` rooted at `home`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::UnknownDriver`] for unregistered names,
    /// [`StrataError::InvalidOption`] for malformed options, or whatever the
    /// backend reports while starting.
    pub fn create(
        &self,
        name: &str,
        home: &Path,
        options: &[String],
    ) -> StrataResult<Box<dyn GraphDriver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StrataError::UnknownDriver {
                name: name.to_string(),
            })?;
        let options = DriverOptions::parse(options)?;

        tracing::debug!(driver = name, home = %home.display(), ?options, "Initializing driver");
        factory(home, &options)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

/// Reject layer IDs that would escape the driver home.
pub(crate) fn validate_layer_id(id: &str) -> StrataResult<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\0') {
        return Err(StrataError::InvalidLayerId { id: id.to_string() });
    }
    Ok(())
}

/// Drop what a failed `create` left behind.
pub(crate) fn remove_partial_layer(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial layer");
        }
        _ => {}
    }
}
