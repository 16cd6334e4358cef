//! Namespace bridge.
//!
//! Makes a driver mount visible inside the target container's mount
//! namespace. The production bridge shells out to two helper programs that
//! perform `setns(2)` followed by `mount(2)` or `umount(2)`:
//!
//! ```text
//! dock-mount  <container> <root> <relative-path>
//! dock-umount <container> <relative-path>
//! ```
//!
//! Program names and argument order are fixed by the helpers.

use std::process::Command;

use strata_common::{StrataError, StrataResult};

/// Default namespace mount helper.
pub const MOUNT_HELPER: &str = "dock-mount";

/// Default namespace unmount helper.
pub const UMOUNT_HELPER: &str = "dock-umount";

/// Mount/unmount inside another container's mount namespace.
pub trait NamespaceBridge: Send + Sync {
    /// Bind `root` + `relative` into `container` at `relative`.
    fn mount(&self, container: &str, root: &str, relative: &str) -> StrataResult<()>;

    /// Unmount `relative` inside `container`.
    fn unmount(&self, container: &str, relative: &str) -> StrataResult<()>;
}

/// Bridge backed by external helper executables.
#[derive(Debug, Clone)]
pub struct HelperBridge {
    mount_program: String,
    umount_program: String,
}

impl HelperBridge {
    /// Bridge using the standard helper names, resolved through `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_programs(MOUNT_HELPER, UMOUNT_HELPER)
    }

    /// Bridge using custom helper programs.
    #[must_use]
    pub fn with_programs(mount: impl Into<String>, umount: impl Into<String>) -> Self {
        Self {
            mount_program: mount.into(),
            umount_program: umount.into(),
        }
    }

    fn run(program: &str, args: &[&str]) -> StrataResult<()> {
        tracing::debug!(program, ?args, "Running namespace helper");

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| StrataError::Bridge {
                operation: program.to_string(),
                message: format!("failed to execute: {e}"),
            })?;

        if !status.success() {
            return Err(StrataError::Bridge {
                operation: program.to_string(),
                message: status.to_string(),
            });
        }

        Ok(())
    }
}

impl Default for HelperBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceBridge for HelperBridge {
    fn mount(&self, container: &str, root: &str, relative: &str) -> StrataResult<()> {
        Self::run(&self.mount_program, &[container, root, relative])
    }

    fn unmount(&self, container: &str, relative: &str) -> StrataResult<()> {
        Self::run(&self.umount_program, &[container, relative])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write a helper script that records its arguments and exits with `code`.
    fn helper_script(dir: &Path, name: &str, code: i32) -> String {
        let script = dir.join(name);
        let log = dir.join(format!("{name}.args"));
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" > '{}'\nexit {code}\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    fn recorded_args(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(format!("{name}.args")))
            .unwrap()
            .trim_end()
            .to_string()
    }

    #[test]
    fn default_helper_names() {
        let bridge = HelperBridge::default();
        assert_eq!(bridge.mount_program, "dock-mount");
        assert_eq!(bridge.umount_program, "dock-umount");
    }

    #[test]
    fn helpers_receive_positional_arguments() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bridge = HelperBridge::with_programs(
            helper_script(temp_dir.path(), "mount", 0),
            helper_script(temp_dir.path(), "umount", 0),
        );

        bridge.mount("ctA", "/data", "/layers/L1/merged").unwrap();
        assert_eq!(
            recorded_args(temp_dir.path(), "mount"),
            "ctA /data /layers/L1/merged"
        );

        bridge.unmount("ctA", "/layers/L1/merged").unwrap();
        assert_eq!(
            recorded_args(temp_dir.path(), "umount"),
            "ctA /layers/L1/merged"
        );
    }

    #[test]
    fn non_zero_exit_is_a_bridge_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let bridge = HelperBridge::with_programs(
            helper_script(temp_dir.path(), "mount", 3),
            helper_script(temp_dir.path(), "umount", 1),
        );

        let err = bridge.mount("ctA", "/data", "/x").unwrap_err();
        assert_eq!(err.kind(), "bridge");
        assert!(err.to_string().contains("exit status: 3"), "{err}");

        assert!(bridge.unmount("ctA", "/x").is_err());
    }

    #[test]
    fn missing_helper_is_a_bridge_error() {
        let bridge = HelperBridge::with_programs(
            "/nonexistent/strata-mount-helper",
            "/nonexistent/strata-umount-helper",
        );

        let err = bridge.mount("ctA", "/data", "/x").unwrap_err();
        assert!(matches!(err, StrataError::Bridge { .. }));
        assert!(err.to_string().contains("failed to execute"));
    }
}
