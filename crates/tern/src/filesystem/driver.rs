//! Copy-on-write drivers.
//!
//! A driver supplies the primitive operations the [`FilesystemStore`] is
//! built on. Paths handed to a driver are absolute and already checked by
//! the store.
//!
//! [`FilesystemStore`]: super::FilesystemStore

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

/// Inode number btrfs gives the root directory of every subvolume.
const BTRFS_SUBVOLUME_INO: u64 = 256;

/// Primitive copy-on-write operations.
#[async_trait]
pub trait CowDriver: Send + Sync + std::fmt::Debug {
    /// Short driver name for logs.
    fn name(&self) -> &'static str;

    /// Check that `root` can host subvolumes.
    async fn validate(&self, root: &Path) -> io::Result<()>;

    /// Create an empty subvolume at `path`.
    async fn create_subvolume(&self, path: &Path) -> io::Result<()>;

    /// Snapshot `source` into the new path `dest`.
    async fn snapshot(&self, source: &Path, dest: &Path, readonly: bool) -> io::Result<()>;

    /// Delete the subvolume, directory or file at `path`.
    async fn delete(&self, path: &Path) -> io::Result<()>;
}

/// Available drivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// btrfs subvolumes and snapshots.
    #[default]
    Btrfs,
    /// Plain directories and deep copies.
    Directory,
}

impl DriverKind {
    /// Instantiate the driver.
    #[must_use]
    pub fn driver(self) -> Arc<dyn CowDriver> {
        match self {
            Self::Btrfs => Arc::new(BtrfsDriver::new()),
            Self::Directory => Arc::new(DirectoryDriver),
        }
    }
}

/// Driver backed by the `btrfs` tool.
#[derive(Debug, Clone)]
pub struct BtrfsDriver {
    program: PathBuf,
}

impl BtrfsDriver {
    /// Use `btrfs` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("btrfs")
    }

    /// Use a specific `btrfs` binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn btrfs(&self, args: &[&OsStr]) -> io::Result<()> {
        tracing::debug!(program = %self.program.display(), ?args, "Running btrfs");

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(io::Error::other(format!(
                "btrfs {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

impl Default for BtrfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CowDriver for BtrfsDriver {
    fn name(&self) -> &'static str {
        "btrfs"
    }

    async fn validate(&self, root: &Path) -> io::Result<()> {
        self.btrfs(&[OsStr::new("filesystem"), OsStr::new("df"), root.as_os_str()])
            .await
    }

    async fn create_subvolume(&self, path: &Path) -> io::Result<()> {
        self.btrfs(&[OsStr::new("subvolume"), OsStr::new("create"), path.as_os_str()])
            .await
    }

    async fn snapshot(&self, source: &Path, dest: &Path, readonly: bool) -> io::Result<()> {
        let mut args = vec![OsStr::new("subvolume"), OsStr::new("snapshot")];
        if readonly {
            args.push(OsStr::new("-r"));
        }
        args.push(source.as_os_str());
        args.push(dest.as_os_str());
        self.btrfs(&args).await
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.is_dir() && meta.ino() == BTRFS_SUBVOLUME_INO {
            self.btrfs(&[OsStr::new("subvolume"), OsStr::new("delete"), path.as_os_str()])
                .await
        } else {
            remove_path(path).await
        }
    }
}

/// Driver for hosts without a copy-on-write filesystem.
///
/// Subvolumes are directories and snapshots are deep copies, so a snapshot
/// never shares state with its source.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryDriver;

#[async_trait]
impl CowDriver for DirectoryDriver {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn validate(&self, root: &Path) -> io::Result<()> {
        let meta = tokio::fs::metadata(root).await?;
        if meta.permissions().readonly() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store root is read-only",
            ));
        }
        Ok(())
    }

    async fn create_subvolume(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    async fn snapshot(&self, source: &Path, dest: &Path, readonly: bool) -> io::Result<()> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || copy_tree(&source, &dest, readonly))
            .await
            .map_err(io::Error::other)?
    }

    async fn delete(&self, path: &Path) -> io::Result<()> {
        remove_path(path).await
    }
}

async fn remove_path(path: &Path) -> io::Result<()> {
    if tokio::fs::symlink_metadata(path).await?.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

/// Copy `source` to `dest`, keeping symlinks and permissions.
fn copy_tree(source: &Path, dest: &Path, readonly: bool) -> io::Result<()> {
    // Directory modes are applied last so read-only directories can be filled.
    let mut dir_modes = Vec::new();

    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if relative.as_os_str().is_empty() {
                fs::create_dir(&target)?;
            } else {
                fs::create_dir_all(&target)?;
            }
            let mode = entry.metadata().map_err(io::Error::other)?.permissions().mode();
            dir_modes.push((target, mode));
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            if readonly {
                let mut perms = fs::metadata(&target)?.permissions();
                perms.set_mode(perms.mode() & !0o222);
                fs::set_permissions(&target, perms)?;
            }
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping special file");
        }
    }

    for (dir, mode) in dir_modes.into_iter().rev() {
        let mode = if readonly { mode & !0o222 } else { mode };
        fs::set_permissions(&dir, fs::Permissions::from_mode(mode))?;
    }

    Ok(())
}
