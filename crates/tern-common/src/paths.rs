//! Standard filesystem paths for Tern.

use std::path::{Path, PathBuf};

/// Default store root (the directory `machinectl` also looks at).
pub const DEFAULT_ROOT: &str = "/var/lib/machines";

/// Default directory for supervisor unit files.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Default directory for per-machine container settings.
pub const DEFAULT_SETTINGS_DIR: &str = "/etc/systemd/nspawn";

/// Default directory for host network descriptors.
pub const DEFAULT_NETWORK_DIR: &str = "/etc/systemd/network";

/// Template unit file name.
pub const UNIT_FILE_NAME: &str = "tern@.service";

/// Prefix of container snapshots inside the store.
pub const CONTAINER_PREFIX: &str = ".#";

/// Prefix of snapshot-attach source volumes inside the store.
pub const VOLUME_PREFIX: &str = ".tern-snapshot-";

/// Standard paths used by the Tern runtime.
///
/// Store-relative helpers (`*_rel`) return paths to hand to the filesystem
/// store; the others are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TernPaths {
    /// Store root directory (default: /var/lib/machines).
    pub root: PathBuf,
    /// Unit file directory (default: /etc/systemd/system).
    pub unit_dir: PathBuf,
    /// Container settings directory (default: /etc/systemd/nspawn).
    pub settings_dir: PathBuf,
    /// Host network descriptor directory (default: /etc/systemd/network).
    pub network_dir: PathBuf,
}

impl TernPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom store root and default system directories.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Create paths with every directory below `base`, for sandboxes and tests.
    #[must_use]
    pub fn sandboxed(base: &Path) -> Self {
        Self {
            root: base.join("machines"),
            unit_dir: base.join("system"),
            settings_dir: base.join("nspawn"),
            network_dir: base.join("network"),
        }
    }

    /// Store-relative path of an image subvolume.
    #[must_use]
    pub fn image_rel(&self, image: &str) -> PathBuf {
        PathBuf::from(image)
    }

    /// Absolute path of an image subvolume.
    #[must_use]
    pub fn image(&self, image: &str) -> PathBuf {
        self.root.join(self.image_rel(image))
    }

    /// Store-relative path of a container snapshot.
    #[must_use]
    pub fn container_rel(&self, container: &str) -> PathBuf {
        PathBuf::from(format!("{CONTAINER_PREFIX}{container}"))
    }

    /// Absolute path of a container snapshot.
    #[must_use]
    pub fn container(&self, container: &str) -> PathBuf {
        self.root.join(self.container_rel(container))
    }

    /// Root-directory prefix the unit joins with its instance name.
    #[must_use]
    pub fn container_prefix(&self) -> String {
        format!("{}/{CONTAINER_PREFIX}", self.root.display())
    }

    /// Store-relative path of a snapshot-attach source volume.
    #[must_use]
    pub fn volume_rel(&self, volume: &str) -> PathBuf {
        PathBuf::from(format!("{VOLUME_PREFIX}{volume}"))
    }

    /// Template unit file.
    #[must_use]
    pub fn unit_file(&self) -> PathBuf {
        self.unit_dir.join(UNIT_FILE_NAME)
    }

    /// Drop-in directory of one unit instance.
    #[must_use]
    pub fn unit_dropin_dir(&self, instance: &str) -> PathBuf {
        self.unit_dir.join(format!("tern@{instance}.service.d"))
    }

    /// Container settings file read by the supervisor at start.
    #[must_use]
    pub fn settings_file(&self, instance: &str) -> PathBuf {
        self.settings_dir.join(format!("{instance}.nspawn"))
    }
}

impl Default for TernPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            settings_dir: PathBuf::from(DEFAULT_SETTINGS_DIR),
            network_dir: PathBuf::from(DEFAULT_NETWORK_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let paths = TernPaths::new();
        assert_eq!(paths.image("base"), PathBuf::from("/var/lib/machines/base"));
        assert_eq!(
            paths.container("test"),
            PathBuf::from("/var/lib/machines/.#test")
        );
        assert_eq!(
            paths.unit_file(),
            PathBuf::from("/etc/systemd/system/tern@.service")
        );
    }

    #[test]
    fn custom_root() {
        let paths = TernPaths::with_root("/srv/tern");
        assert_eq!(paths.container_prefix(), "/srv/tern/.#");
        assert_eq!(paths.unit_dir, PathBuf::from(DEFAULT_UNIT_DIR));
    }

    #[test]
    fn store_relative_paths() {
        let paths = TernPaths::new();
        assert_eq!(paths.container_rel("test"), PathBuf::from(".#test"));
        assert_eq!(
            paths.volume_rel("pgdata"),
            PathBuf::from(".tern-snapshot-pgdata")
        );
    }

    #[test]
    fn instance_files() {
        let paths = TernPaths::sandboxed(Path::new("/tmp/t"));
        assert_eq!(
            paths.unit_dropin_dir("web"),
            PathBuf::from("/tmp/t/system/tern@web.service.d")
        );
        assert_eq!(
            paths.settings_file("web"),
            PathBuf::from("/tmp/t/nspawn/web.nspawn")
        );
    }
}
