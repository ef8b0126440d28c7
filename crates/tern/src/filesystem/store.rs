//! Filesystem store.
//!
//! The store is the only mutator of the on-disk image and container trees.
//! Every path it accepts is relative to the store root.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tern_common::{TernError, TernResult};

use super::driver::CowDriver;

/// Copy-on-write store of images, containers and volumes.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    /// Store root directory.
    root: PathBuf,
    /// Primitive operations.
    driver: Arc<dyn CowDriver>,
}

impl FilesystemStore {
    /// Open the store at `root`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Init`] if `root` is not a usable directory or the
    /// driver rejects it.
    pub async fn init(root: impl Into<PathBuf>, driver: Arc<dyn CowDriver>) -> TernResult<Self> {
        let root = root.into();
        let fail = |reason: String| TernError::Init {
            root: root.clone(),
            reason,
        };

        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(fail("not a directory".to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|e| fail(e.to_string()))?;
            }
            Err(e) => return Err(fail(e.to_string())),
        }

        driver
            .validate(&root)
            .await
            .map_err(|e| fail(format!("{} driver: {e}", driver.name())))?;

        tracing::debug!(root = %root.display(), driver = driver.name(), "Store opened");
        Ok(Self { root, driver })
    }

    /// Store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store-relative path.
    ///
    /// Leading `/` is ignored, so `/data` and `data` name the same entry.
    /// Parent components are rejected, and so is a path with a symlink among
    /// its ancestors below the root. The final component may be a symlink.
    ///
    /// # Errors
    ///
    /// Returns the reason the path cannot name an entry inside the store.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, String> {
        let path = path.as_ref();
        let mut parts = Vec::new();

        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    return Err(format!("{} escapes the store", path.display()));
                }
                Component::Normal(part) => parts.push(part),
            }
        }

        let Some(last) = parts.len().checked_sub(1) else {
            return Err("empty path".to_string());
        };

        let mut resolved = self.root.clone();
        for (index, part) in parts.into_iter().enumerate() {
            resolved.push(part);
            let is_link = std::fs::symlink_metadata(&resolved)
                .is_ok_and(|meta| meta.file_type().is_symlink());
            if index < last && is_link {
                return Err(format!(
                    "{} passes through the symlink {}",
                    path.display(),
                    resolved.display()
                ));
            }
        }
        Ok(resolved)
    }

    /// Check whether a path exists. Dangling symlinks count as existing.
    #[must_use]
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path)
            .is_ok_and(|p| std::fs::symlink_metadata(p).is_ok())
    }

    /// Create a new subvolume.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Create`] if the parent is missing, the path
    /// already exists or the driver fails.
    pub async fn subvolume(&self, path: impl AsRef<Path>) -> TernResult<PathBuf> {
        let requested = path.as_ref();
        let fail = |reason: String| TernError::Create {
            path: self.root.join(requested),
            reason,
        };

        let target = self.resolve(requested).map_err(fail)?;

        if std::fs::symlink_metadata(&target).is_ok() {
            return Err(fail("already exists".to_string()));
        }
        if !target.parent().is_some_and(Path::is_dir) {
            return Err(fail("parent directory does not exist".to_string()));
        }

        self.driver
            .create_subvolume(&target)
            .await
            .map_err(|e| fail(e.to_string()))?;

        tracing::info!(path = %target.display(), "Subvolume created");
        Ok(target)
    }

    /// Snapshot `source` into `dest`.
    ///
    /// `dest` must not exist; callers replacing a path remove it first.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Snapshot`] if `source` is absent, `dest` exists,
    /// the parent of `dest` is missing or the driver fails.
    pub async fn snapshot(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        readonly: bool,
    ) -> TernResult<PathBuf> {
        let source = source.as_ref();
        let requested = dest.as_ref();
        let fail = |reason: String| TernError::Snapshot {
            dest: self.root.join(requested),
            reason,
        };

        let from = self.resolve(source).map_err(&fail)?;
        let to = self.resolve(requested).map_err(&fail)?;

        if !from.is_dir() {
            return Err(fail(format!("source {} does not exist", source.display())));
        }
        if std::fs::symlink_metadata(&to).is_ok() {
            return Err(fail("destination already exists".to_string()));
        }
        if !to.parent().is_some_and(Path::is_dir) {
            return Err(fail("parent directory does not exist".to_string()));
        }

        self.driver
            .snapshot(&from, &to, readonly)
            .await
            .map_err(|e| fail(e.to_string()))?;

        tracing::info!(
            source = %from.display(),
            dest = %to.display(),
            readonly,
            "Snapshot created"
        );
        Ok(to)
    }

    /// Remove a subvolume, snapshot, directory or file.
    ///
    /// Removing a path that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Snapshot`] if the driver cannot delete the path.
    pub async fn remove(&self, path: impl AsRef<Path>) -> TernResult<()> {
        let requested = path.as_ref();
        let fail = |reason: String| TernError::Snapshot {
            dest: self.root.join(requested),
            reason,
        };

        let target = self.resolve(requested).map_err(fail)?;
        if std::fs::symlink_metadata(&target).is_err() {
            return Ok(());
        }

        self.driver
            .delete(&target)
            .await
            .map_err(|e| fail(format!("cannot remove: {e}")))?;

        tracing::debug!(path = %target.display(), "Removed");
        Ok(())
    }

    /// Create a plain directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Create`] if the directories cannot be created.
    pub async fn create_dir_all(&self, path: impl AsRef<Path>) -> TernResult<PathBuf> {
        let requested = path.as_ref();
        let fail = |reason: String| TernError::Create {
            path: self.root.join(requested),
            reason,
        };

        let target = self.resolve(requested).map_err(fail)?;
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::DirectoryDriver;

    async fn store() -> (tempfile::TempDir, FilesystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::init(dir.path().join("machines"), Arc::new(DirectoryDriver))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn init_creates_root() {
        let (dir, store) = store().await;
        assert!(dir.path().join("machines").is_dir());
        assert_eq!(store.root(), dir.path().join("machines"));
    }

    #[tokio::test]
    async fn init_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();
        let err = FilesystemStore::init(&file, Arc::new(DirectoryDriver))
            .await
            .unwrap_err();
        assert!(matches!(err, TernError::Init { .. }));
    }

    #[tokio::test]
    async fn subvolume_collisions() {
        let (_dir, store) = store().await;
        store.subvolume("base").await.unwrap();

        let exists = store.subvolume("base").await.unwrap_err();
        assert!(matches!(exists, TernError::Create { .. }));

        let orphan = store.subvolume("missing/child").await.unwrap_err();
        assert!(matches!(orphan, TernError::Create { .. }));
    }

    #[tokio::test]
    async fn snapshot_then_exists() {
        let (_dir, store) = store().await;
        let base = store.subvolume("base").await.unwrap();
        std::fs::write(base.join("os-release"), "ID=arch\n").unwrap();

        let snap = store.snapshot("base", ".#test", false).await.unwrap();

        assert!(store.exists(".#test"));
        assert_eq!(std::fs::read_to_string(snap.join("os-release")).unwrap(), "ID=arch\n");

        std::fs::write(snap.join("os-release"), "ID=changed\n").unwrap();
        assert_eq!(std::fs::read_to_string(base.join("os-release")).unwrap(), "ID=arch\n");
    }

    #[tokio::test]
    async fn snapshot_errors() {
        let (_dir, store) = store().await;
        let missing = store.snapshot("missing-image", ".#test", false).await.unwrap_err();
        assert!(matches!(missing, TernError::Snapshot { .. }));
        assert!(!store.exists(".#test"));

        store.subvolume("base").await.unwrap();
        store.snapshot("base", ".#test", false).await.unwrap();
        let taken = store.snapshot("base", ".#test", false).await.unwrap_err();
        assert!(matches!(taken, TernError::Snapshot { .. }));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_dir, store) = store().await;
        store.subvolume("base").await.unwrap();

        store.remove("base").await.unwrap();
        assert!(!store.exists("base"));
        store.remove("base").await.unwrap();
    }

    #[tokio::test]
    async fn paths_stay_inside_the_store() {
        let (_dir, store) = store().await;
        assert_eq!(
            store.resolve("/.#test//data").unwrap(),
            store.root().join(".#test/data")
        );
        assert!(store.resolve("../etc").is_err());
        assert!(store.resolve("/").is_err());
        assert!(!store.exists("../"));

        let err = store.subvolume("../escape").await.unwrap_err();
        assert!(matches!(err, TernError::Create { .. }));
    }

    #[tokio::test]
    async fn symlinked_ancestors_are_not_followed() {
        let (dir, store) = store().await;
        let host = dir.path().join("host/opt");
        std::fs::create_dir_all(host.join("app")).unwrap();
        std::fs::write(host.join("app/precious"), "keep").unwrap();

        let base = store.subvolume("base").await.unwrap();
        std::os::unix::fs::symlink(&host, base.join("opt")).unwrap();

        assert!(store.resolve("base/opt").is_ok());
        assert!(store.resolve("base/opt/app").is_err());
        assert!(!store.exists("base/opt/app"));

        let err = store.remove("base/opt/app").await.unwrap_err();
        assert!(matches!(err, TernError::Snapshot { .. }));
        let err = store.create_dir_all("base/opt/app/new").await.unwrap_err();
        assert!(matches!(err, TernError::Create { .. }));
        assert!(host.join("app/precious").exists());

        // The link itself is removed, never its target.
        store.remove("base/opt").await.unwrap();
        assert!(host.join("app/precious").exists());
    }
}
