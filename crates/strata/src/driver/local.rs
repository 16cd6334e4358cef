//! Directory-copy layer driver.
//!
//! Every layer is a plain directory holding the complete layer tree.
//! Creating a child layer copies its parent's tree, so `get` needs no
//! kernel mount and works without privileges.
//!
//! Layout under the driver home:
//!
//! ```text
//! <home>/<id>/merged   full layer contents
//! <home>/<id>/parent   parent layer ID (absent for base layers)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use strata_common::{DriverOptions, StrataError, StrataResult};

use super::{GraphDriver, remove_partial_layer, validate_layer_id};

const MERGED_DIR: &str = "merged";
const PARENT_FILE: &str = "parent";

/// Directory-copy driver registered as `local`.
pub struct LocalDriver {
    /// Driver home directory.
    home: PathBuf,
    /// Copy the parent tree into new layers (`copy=false` disables).
    copy_parent: bool,
    /// Outstanding `get` references per layer.
    refs: Mutex<HashMap<String, usize>>,
}

impl LocalDriver {
    /// Registry name.
    pub const NAME: &'static str = "local";

    /// Start the driver in `home`, creating the directory if needed.
    pub fn new(home: &Path, options: &DriverOptions) -> StrataResult<Self> {
        let copy_parent = options.get_bool("copy", true)?;
        fs::create_dir_all(home)?;

        tracing::info!(home = %home.display(), copy_parent, "Local driver started");

        Ok(Self {
            home: home.to_path_buf(),
            copy_parent,
            refs: Mutex::new(HashMap::new()),
        })
    }

    /// Get the directory for a layer.
    pub fn layer_path(&self, id: &str) -> PathBuf {
        self.home.join(id)
    }

    /// Get the contents directory for a layer.
    pub fn merged_path(&self, id: &str) -> PathBuf {
        self.layer_path(id).join(MERGED_DIR)
    }

    fn read_parent(&self, id: &str) -> StrataResult<Option<String>> {
        let path = self.layer_path(id).join(PARENT_FILE);

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(Some(content.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn count_layers(&self) -> usize {
        fs::read_dir(&self.home)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.path().join(MERGED_DIR).is_dir())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Fill the directories of a new layer.
    fn populate(&self, id: &str, parent: &str, merged: &Path) -> StrataResult<()> {
        if parent.is_empty() {
            fs::create_dir_all(merged)?;
            return Ok(());
        }

        if self.copy_parent {
            copy_tree(&self.merged_path(parent), merged)?;
        } else {
            fs::create_dir_all(merged)?;
        }
        fs::write(self.layer_path(id).join(PARENT_FILE), parent)?;
        Ok(())
    }

    fn refs_for(&self, id: &str) -> usize {
        self.refs.lock().get(id).copied().unwrap_or(0)
    }
}

impl GraphDriver for LocalDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn status(&self) -> Vec<(String, String)> {
        vec![
            ("Driver".to_string(), Self::NAME.to_string()),
            ("Root Dir".to_string(), self.home.display().to_string()),
            ("Layers".to_string(), self.count_layers().to_string()),
        ]
    }

    fn create(&self, id: &str, parent: &str) -> StrataResult<()> {
        validate_layer_id(id)?;
        if self.exists(id) {
            return Err(StrataError::LayerExists { id: id.to_string() });
        }

        if !parent.is_empty() {
            validate_layer_id(parent)?;
            if !self.exists(parent) {
                return Err(StrataError::LayerNotFound {
                    id: parent.to_string(),
                });
            }
        }

        let merged = self.merged_path(id);
        if let Err(e) = self.populate(id, parent, &merged) {
            remove_partial_layer(&self.layer_path(id));
            return Err(e);
        }

        tracing::debug!(id, parent, path = %merged.display(), "Layer created");
        Ok(())
    }

    fn remove(&self, id: &str) -> StrataResult<()> {
        validate_layer_id(id)?;
        if !self.exists(id) {
            return Err(StrataError::LayerNotFound { id: id.to_string() });
        }

        let refs = self.refs_for(id);
        if refs > 0 {
            return Err(StrataError::LayerInUse {
                id: id.to_string(),
                refs,
            });
        }

        fs::remove_dir_all(self.layer_path(id))?;

        tracing::debug!(id, "Layer removed");
        Ok(())
    }

    fn get(&self, id: &str, mount_label: &str) -> StrataResult<PathBuf> {
        validate_layer_id(id)?;
        if !self.exists(id) {
            return Err(StrataError::LayerNotFound { id: id.to_string() });
        }

        let mut refs = self.refs.lock();
        let count = refs.entry(id.to_string()).or_insert(0);
        *count += 1;

        tracing::debug!(id, mount_label, refs = *count, "Layer referenced");
        Ok(self.merged_path(id))
    }

    fn put(&self, id: &str) -> StrataResult<()> {
        let mut refs = self.refs.lock();

        match refs.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                tracing::debug!(id, refs = *count, "Layer released");
            }
            Some(_) => {
                refs.remove(id);
                tracing::debug!(id, refs = 0, "Layer released");
            }
            None => tracing::debug!(id, "Put for unreferenced layer ignored"),
        }

        Ok(())
    }

    fn exists(&self, id: &str) -> bool {
        validate_layer_id(id).is_ok() && self.merged_path(id).is_dir()
    }

    fn cleanup(&self) -> StrataResult<()> {
        let mut refs = self.refs.lock();
        if !refs.is_empty() {
            tracing::warn!(layers = refs.len(), "Dropping outstanding layer references");
        }
        refs.clear();
        Ok(())
    }

    fn metadata(&self, id: &str) -> StrataResult<HashMap<String, String>> {
        validate_layer_id(id)?;
        if !self.exists(id) {
            return Err(StrataError::LayerNotFound { id: id.to_string() });
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "Dir".to_string(),
            self.merged_path(id).display().to_string(),
        );
        if let Some(parent) = self.read_parent(id)? {
            metadata.insert("Parent".to_string(), parent);
        }
        Ok(metadata)
    }
}

/// Recursively copy `src` into `dst`, preserving symlinks.
fn copy_tree(src: &Path, dst: &Path) -> StrataResult<()> {
    fs::create_dir_all(dst)?;

    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| StrataError::Internal {
            message: format!("Failed to walk directory: {}", e),
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| StrataError::Internal {
                message: format!("Walked outside of {}: {}", src.display(), e),
            })?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)?;
            #[cfg(not(unix))]
            tracing::warn!(link = %link.display(), "Skipping symlink on this platform");
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}
