//! The proxy service.
//!
//! [`ProxyService`] owns the driver handle and the table of layers that are
//! currently bridged into the target container. Every handler runs to
//! completion under one lock, so concurrent transport connections see the
//! handlers as strictly serialized.
//!
//! The service starts uninitialized; `init` installs a driver and from then
//! on it stays ready. Every handler except `init` fails with
//! [`StrataError::NotInitialized`] until then.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use strata_common::{StrataError, StrataResult};

use crate::bridge::{HelperBridge, NamespaceBridge};
use crate::config::ProxyConfig;
use crate::driver::{DriverRegistry, GraphDriver};

/// Mutable state guarded by the service lock.
#[derive(Default)]
struct ProxyState {
    driver: Option<Box<dyn GraphDriver>>,
    /// Layer ID -> root-relative mount path.
    mounts: HashMap<String, String>,
}

impl ProxyState {
    fn driver(&self) -> StrataResult<&dyn GraphDriver> {
        self.driver.as_deref().ok_or(StrataError::NotInitialized)
    }
}

/// Stateful mediator between remote callers and the local driver.
pub struct ProxyService {
    root: PathBuf,
    /// `root` as handed to the namespace helpers.
    root_arg: String,
    container_name: String,
    registry: DriverRegistry,
    bridge: Box<dyn NamespaceBridge>,
    state: Mutex<ProxyState>,
}

impl ProxyService {
    /// Create the service with the bundled drivers and helper bridge.
    #[must_use]
    pub fn new(config: &ProxyConfig) -> Self {
        Self::with_parts(
            config.root(),
            &config.container_name,
            DriverRegistry::with_builtin(),
            HelperBridge::with_programs(&config.mount_helper, &config.umount_helper),
        )
    }

    /// Create the service from explicit collaborators.
    pub fn with_parts(
        root: impl Into<PathBuf>,
        container_name: impl Into<String>,
        registry: DriverRegistry,
        bridge: impl NamespaceBridge + 'static,
    ) -> Self {
        let root = root.into();
        Self {
            root_arg: root.display().to_string(),
            root,
            container_name: container_name.into(),
            registry,
            bridge: Box::new(bridge),
            state: Mutex::new(ProxyState::default()),
        }
    }

    /// The proxy root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The container layers are bridged into.
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Whether `init` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().driver.is_some()
    }

    /// Snapshot of the tracked mounts (layer ID -> relative path).
    #[must_use]
    pub fn mounts(&self) -> HashMap<String, String> {
        self.state.lock().mounts.clone()
    }

    /// Start driver `driver_name` in `root + home` and forget all tracked mounts.
    ///
    /// `home` is always placed under the root, with or without a leading `/`.
    /// On failure the previous state is left untouched.
    pub fn init(&self, driver_name: &str, home: &str, options: &[String]) -> StrataResult<()> {
        let home = self.root.join(home.trim_start_matches('/'));
        let driver = self.registry.create(driver_name, &home, options)?;

        let mut state = self.state.lock();
        if state.driver.is_some() {
            tracing::warn!(
                driver = driver_name,
                tracked = state.mounts.len(),
                "Re-initializing proxy; previous driver and tracked mounts are dropped"
            );
        }
        state.driver = Some(driver);
        state.mounts.clear();

        tracing::info!(driver = driver_name, home = %home.display(), "Proxy initialized");
        Ok(())
    }

    /// Driver diagnostics.
    pub fn status(&self) -> StrataResult<Vec<(String, String)>> {
        let state = self.state.lock();
        Ok(state.driver()?.status())
    }

    /// Create layer `id` on top of `parent`.
    pub fn create(&self, id: &str, parent: &str) -> StrataResult<()> {
        let state = self.state.lock();
        state.driver()?.create(id, parent)
    }

    /// Remove layer `id`. Tracked mounts are not consulted.
    pub fn remove(&self, id: &str) -> StrataResult<()> {
        let state = self.state.lock();
        state.driver()?.remove(id)
    }

    /// Mount layer `id` and bridge it into the container.
    ///
    /// Returns the mount path relative to the proxy root. On error the
    /// driver-side mount has been released and nothing is tracked.
    pub fn get(&self, id: &str, mount_label: &str) -> StrataResult<String> {
        let mut state = self.state.lock();
        let ProxyState { driver, mounts } = &mut *state;
        let driver = driver.as_deref().ok_or(StrataError::NotInitialized)?;

        if mounts.contains_key(id) {
            return Err(StrataError::AlreadyMounted { id: id.to_string() });
        }

        let mount_path = driver.get(id, mount_label)?;

        let Some(relative) = relative_to(&self.root, &mount_path) else {
            release(driver, id);
            return Err(StrataError::ContractViolation {
                id: id.to_string(),
                path: mount_path.display().to_string(),
                root: self.root_arg.clone(),
            });
        };

        if let Err(e) = self
            .bridge
            .mount(&self.container_name, &self.root_arg, &relative)
        {
            tracing::warn!(id, path = %relative, error = %e, "Namespace mount failed");
            release(driver, id);
            return Err(e);
        }

        mounts.insert(id.to_string(), relative.clone());

        tracing::info!(id, path = %relative, container = %self.container_name, "Layer mounted");
        Ok(relative)
    }

    /// Unmount layer `id` from the container and release the driver mount.
    ///
    /// If the namespace unmount fails the layer stays tracked so the caller
    /// can retry.
    pub fn put(&self, id: &str) -> StrataResult<()> {
        let mut state = self.state.lock();
        let ProxyState { driver, mounts } = &mut *state;
        let driver = driver.as_deref().ok_or(StrataError::NotInitialized)?;

        let relative = mounts
            .get(id)
            .cloned()
            .ok_or_else(|| StrataError::UnbalancedPut { id: id.to_string() })?;

        if let Err(e) = self.bridge.unmount(&self.container_name, &relative) {
            tracing::warn!(id, path = %relative, error = %e, "Namespace unmount failed");
            return Err(e);
        }
        mounts.remove(id);

        release(driver, id);

        tracing::info!(id, path = %relative, container = %self.container_name, "Layer unmounted");
        Ok(())
    }

    /// Whether layer `id` exists.
    pub fn exists(&self, id: &str) -> StrataResult<bool> {
        let state = self.state.lock();
        Ok(state.driver()?.exists(id))
    }

    /// Driver-wide cleanup. Tracked mounts are kept.
    pub fn cleanup(&self) -> StrataResult<()> {
        let state = self.state.lock();
        let driver = state.driver()?;

        if !state.mounts.is_empty() {
            tracing::warn!(
                tracked = state.mounts.len(),
                "Driver cleanup with layers still bridged into the container"
            );
        }
        driver.cleanup()
    }

    /// Backend-specific metadata for layer `id`.
    pub fn get_metadata(&self, id: &str) -> StrataResult<HashMap<String, String>> {
        let state = self.state.lock();
        state.driver()?.metadata(id)
    }
}

/// Release a driver mount; failures are logged, never surfaced.
fn release(driver: &dyn GraphDriver, id: &str) {
    if let Err(e) = driver.put(id) {
        tracing::warn!(id, driver = driver.name(), error = %e, "Driver put failed");
    }
}

/// `path` relative to `root`, as an absolute-looking path (`/layers/L1`).
fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    Some(format!("/{}", rest.display()))
}
