//! OverlayFS layer driver.
//!
//! Layout under the driver home:
//!
//! ```text
//! <home>/<id>/diff     layer's own changes (upper dir when mounted)
//! <home>/<id>/work     overlayfs work dir
//! <home>/<id>/merged   mount point
//! <home>/<id>/lower    colon-separated lower diff dirs, nearest parent first
//! <home>/<id>/parent   parent layer ID
//! ```
//!
//! Base layers have no lower dirs and are served from `diff` directly.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use strata_common::{DriverOptions, StrataError, StrataResult};

use super::{GraphDriver, remove_partial_layer, validate_layer_id};

const DIFF_DIR: &str = "diff";
const WORK_DIR: &str = "work";
const MERGED_DIR: &str = "merged";
const LOWER_FILE: &str = "lower";
const PARENT_FILE: &str = "parent";

/// OverlayFS mount description for one layer.
#[derive(Debug, Clone)]
pub struct OverlayMount {
    /// Lower directories (read-only layers), nearest first.
    pub lower_dirs: Vec<PathBuf>,
    /// Upper directory (writable layer).
    pub upper_dir: PathBuf,
    /// Work directory (required by overlayfs).
    pub work_dir: PathBuf,
    /// Merged mount point.
    pub merged_dir: PathBuf,
    /// Extra comma-separated mount options.
    pub extra_options: Option<String>,
    /// SELinux context label for the mount.
    pub mount_label: Option<String>,
}

impl OverlayMount {
    /// Get the mount options string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let lower = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");

        let mut options = format!(
            "lowerdir={},upperdir={},workdir={}",
            lower,
            self.upper_dir.display(),
            self.work_dir.display()
        );

        if let Some(extra) = self.extra_options.as_deref().filter(|e| !e.is_empty()) {
            options.push(',');
            options.push_str(extra);
        }
        if let Some(label) = self.mount_label.as_deref().filter(|l| !l.is_empty()) {
            options.push_str(&format!(",context=\"{label}\""));
        }

        options
    }

    /// Mount the overlay filesystem.
    #[cfg(target_os = "linux")]
    pub fn mount(&self) -> StrataResult<()> {
        use rustix::mount::{MountFlags, mount};
        use std::ffi::CString;

        fs::create_dir_all(&self.work_dir)?;
        fs::create_dir_all(&self.merged_dir)?;

        let options = self.mount_options();

        tracing::debug!(
            merged = %self.merged_dir.display(),
            options = %options,
            "Mounting overlayfs"
        );

        let options_c = CString::new(options).map_err(|_| StrataError::Config {
            message: "Invalid overlay options (contains null byte)".to_string(),
        })?;

        mount(
            "overlay",
            &self.merged_dir,
            "overlay",
            MountFlags::empty(),
            Some(options_c.as_c_str()),
        )
        .map_err(|e| StrataError::driver(format!("overlay mount failed: {e}")))?;

        tracing::info!(merged = %self.merged_dir.display(), "OverlayFS mounted");
        Ok(())
    }

    /// Mount the overlay filesystem.
    #[cfg(not(target_os = "linux"))]
    pub fn mount(&self) -> StrataResult<()> {
        Err(StrataError::Unsupported {
            feature: "overlayfs".to_string(),
        })
    }

    /// Unmount the overlay filesystem.
    #[cfg(target_os = "linux")]
    pub fn unmount(&self) -> StrataResult<()> {
        use rustix::mount::{UnmountFlags, unmount};

        tracing::debug!(merged = %self.merged_dir.display(), "Unmounting overlayfs");

        unmount(&self.merged_dir, UnmountFlags::DETACH)
            .map_err(|e| StrataError::driver(format!("overlay unmount failed: {e}")))?;

        tracing::info!(merged = %self.merged_dir.display(), "OverlayFS unmounted");
        Ok(())
    }

    /// Unmount the overlay filesystem.
    #[cfg(not(target_os = "linux"))]
    pub fn unmount(&self) -> StrataResult<()> {
        Err(StrataError::Unsupported {
            feature: "overlayfs".to_string(),
        })
    }
}

/// OverlayFS driver registered as `overlay`.
pub struct OverlayDriver {
    home: PathBuf,
    /// Value of the `mountopt` option, appended to every mount.
    mount_options: Option<String>,
    refs: Mutex<HashMap<String, usize>>,
}

impl OverlayDriver {
    /// Registry name.
    pub const NAME: &'static str = "overlay";

    /// Start the driver in `home`.
    pub fn new(home: &Path, options: &DriverOptions) -> StrataResult<Self> {
        #[cfg(not(target_os = "linux"))]
        {
            let _ = (home, options);
            return Err(StrataError::Unsupported {
                feature: "overlayfs".to_string(),
            });
        }

        #[cfg(target_os = "linux")]
        {
            fs::create_dir_all(home)?;
            let mount_options = options.get("mountopt").map(str::to_string);

            tracing::info!(home = %home.display(), ?mount_options, "Overlay driver started");

            Ok(Self {
                home: home.to_path_buf(),
                mount_options,
                refs: Mutex::new(HashMap::new()),
            })
        }
    }

    fn layer_path(&self, id: &str) -> PathBuf {
        self.home.join(id)
    }

    fn diff_path(&self, id: &str) -> PathBuf {
        self.layer_path(id).join(DIFF_DIR)
    }

    /// Lower dirs recorded for a layer, nearest parent first.
    fn lower_dirs(&self, id: &str) -> StrataResult<Vec<PathBuf>> {
        let path = self.layer_path(id).join(LOWER_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        Ok(content
            .trim()
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Mount description for `id`, or `None` for base layers.
    fn overlay_for(&self, id: &str, mount_label: &str) -> StrataResult<Option<OverlayMount>> {
        let lower_dirs = self.lower_dirs(id)?;
        if lower_dirs.is_empty() {
            return Ok(None);
        }

        let layer = self.layer_path(id);
        Ok(Some(OverlayMount {
            lower_dirs,
            upper_dir: layer.join(DIFF_DIR),
            work_dir: layer.join(WORK_DIR),
            merged_dir: layer.join(MERGED_DIR),
            extra_options: self.mount_options.clone(),
            mount_label: (!mount_label.is_empty()).then(|| mount_label.to_string()),
        }))
    }

    fn release(&self, id: &str) -> StrataResult<()> {
        if let Some(overlay) = self.overlay_for(id, "")? {
            overlay.unmount()?;
        }
        Ok(())
    }
}

impl GraphDriver for OverlayDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn status(&self) -> Vec<(String, String)> {
        let layers = fs::read_dir(&self.home)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().join(DIFF_DIR).is_dir())
                    .count()
            })
            .unwrap_or(0);

        vec![
            ("Driver".to_string(), Self::NAME.to_string()),
            ("Backing Filesystem".to_string(), "overlay".to_string()),
            ("Root Dir".to_string(), self.home.display().to_string()),
            ("Layers".to_string(), layers.to_string()),
            ("Mounted".to_string(), self.refs.lock().len().to_string()),
        ]
    }

    fn create(&self, id: &str, parent: &str) -> StrataResult<()> {
        validate_layer_id(id)?;
        if self.exists(id) {
            return Err(StrataError::LayerExists { id: id.to_string() });
        }

        let layer = self.layer_path(id);
        let lower = if parent.is_empty() {
            None
        } else {
            validate_layer_id(parent)?;
            if !self.exists(parent) {
                return Err(StrataError::LayerNotFound {
                    id: parent.to_string(),
                });
            }

            let mut chain = vec![self.diff_path(parent)];
            chain.extend(self.lower_dirs(parent)?);
            Some(
                chain
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":"),
            )
        };

        let populate = || -> StrataResult<()> {
            fs::create_dir_all(layer.join(DIFF_DIR))?;
            fs::create_dir_all(layer.join(WORK_DIR))?;
            fs::create_dir_all(layer.join(MERGED_DIR))?;
            if let Some(lower) = &lower {
                fs::write(layer.join(LOWER_FILE), lower)?;
                fs::write(layer.join(PARENT_FILE), parent)?;
            }
            Ok(())
        };
        if let Err(e) = populate() {
            remove_partial_layer(&layer);
            return Err(e);
        }

        tracing::debug!(id, parent, path = %layer.display(), "Layer created");
        Ok(())
    }

    fn remove(&self, id: &str) -> StrataResult<()> {
        validate_layer_id(id)?;
        if !self.exists(id) {
            return Err(StrataError::LayerNotFound { id: id.to_string() });
        }

        let refs = self.refs.lock().get(id).copied().unwrap_or(0);
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
        let count = refs.get(id).copied().unwrap_or(0);

        let path = match self.overlay_for(id, mount_label)? {
            None => self.diff_path(id),
            Some(overlay) => {
                if count == 0 {
                    overlay.mount()?;
                }
                overlay.merged_dir
            }
        };

        refs.insert(id.to_string(), count + 1);
        tracing::debug!(id, refs = count + 1, path = %path.display(), "Layer referenced");
        Ok(path)
    }

    fn put(&self, id: &str) -> StrataResult<()> {
        let mut refs = self.refs.lock();

        match refs.get(id).copied() {
            None => {
                tracing::debug!(id, "Put for unreferenced layer ignored");
                Ok(())
            }
            Some(count) if count > 1 => {
                refs.insert(id.to_string(), count - 1);
                Ok(())
            }
            Some(_) => {
                refs.remove(id);
                self.release(id)
            }
        }
    }

    fn exists(&self, id: &str) -> bool {
        validate_layer_id(id).is_ok() && self.diff_path(id).is_dir()
    }

    fn cleanup(&self) -> StrataResult<()> {
        let mut refs = self.refs.lock();

        for id in refs.keys() {
            if let Err(e) = self.release(id) {
                tracing::warn!(id = %id, error = %e, "Failed to unmount layer during cleanup");
            }
        }
        refs.clear();

        Ok(())
    }

    fn metadata(&self, id: &str) -> StrataResult<HashMap<String, String>> {
        validate_layer_id(id)?;
        if !self.exists(id) {
            return Err(StrataError::LayerNotFound { id: id.to_string() });
        }

        let layer = self.layer_path(id);
        let mut metadata = HashMap::new();
        metadata.insert(
            "UpperDir".to_string(),
            layer.join(DIFF_DIR).display().to_string(),
        );

        let lower_dirs = self.lower_dirs(id)?;
        if !lower_dirs.is_empty() {
            metadata.insert(
                "LowerDir".to_string(),
                lower_dirs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":"),
            );
            metadata.insert(
                "WorkDir".to_string(),
                layer.join(WORK_DIR).display().to_string(),
            );
            metadata.insert(
                "MergedDir".to_string(),
                layer.join(MERGED_DIR).display().to_string(),
            );
        }

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_mount_options() {
        let overlay = OverlayMount {
            lower_dirs: vec![PathBuf::from("/layer1"), PathBuf::from("/layer2")],
            upper_dir: PathBuf::from("/upper"),
            work_dir: PathBuf::from("/work"),
            merged_dir: PathBuf::from("/merged"),
            extra_options: None,
            mount_label: None,
        };

        assert_eq!(
            overlay.mount_options(),
            "lowerdir=/layer1:/layer2,upperdir=/upper,workdir=/work"
        );
    }

    #[test]
    fn mount_label_and_extra_options() {
        let overlay = OverlayMount {
            lower_dirs: vec![PathBuf::from("/l")],
            upper_dir: PathBuf::from("/u"),
            work_dir: PathBuf::from("/w"),
            merged_dir: PathBuf::from("/m"),
            extra_options: Some("nodev".to_string()),
            mount_label: Some("system_u:object_r:container_file_t:s0".to_string()),
        };

        let options = overlay.mount_options();
        assert!(options.ends_with(",nodev,context=\"system_u:object_r:container_file_t:s0\""));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lower_chain_follows_parents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = OverlayDriver::new(temp_dir.path(), &DriverOptions::default()).unwrap();

        driver.create("base", "").unwrap();
        driver.create("mid", "base").unwrap();
        driver.create("top", "mid").unwrap();

        let lowers = driver.lower_dirs("top").unwrap();
        assert_eq!(
            lowers,
            vec![
                temp_dir.path().join("mid").join("diff"),
                temp_dir.path().join("base").join("diff"),
            ]
        );

        let metadata = driver.metadata("top").unwrap();
        assert!(metadata.contains_key("LowerDir"));
        assert!(metadata.contains_key("MergedDir"));
        assert!(!driver.metadata("base").unwrap().contains_key("LowerDir"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn base_layer_is_served_from_diff() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = OverlayDriver::new(temp_dir.path(), &DriverOptions::default()).unwrap();

        driver.create("base", "").unwrap();
        let path = driver.get("base", "").unwrap();
        assert_eq!(path, temp_dir.path().join("base").join("diff"));

        assert!(matches!(
            driver.remove("base").unwrap_err(),
            StrataError::LayerInUse { refs: 1, .. }
        ));
        driver.put("base").unwrap();
        driver.remove("base").unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_create_leaves_no_layer_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = OverlayDriver::new(temp_dir.path(), &DriverOptions::default()).unwrap();

        // A file where the work directory belongs.
        fs::create_dir_all(temp_dir.path().join("L1")).unwrap();
        fs::write(temp_dir.path().join("L1").join("work"), "").unwrap();

        assert!(driver.create("L1", "").is_err());
        assert!(!driver.exists("L1"));
        assert!(!temp_dir.path().join("L1").exists());

        driver.create("L1", "").unwrap();
        assert!(driver.exists("L1"));
    }
}
