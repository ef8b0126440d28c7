//! Named volumes.
//!
//! A volume is a subvolume at `<root>/.tern-snapshot-<name>` that containers
//! receive fresh snapshots of through `run --snapshot=<name>:<path>`.

use std::path::PathBuf;

use tern_common::paths::VOLUME_PREFIX;
use tern_common::{ContainerName, TernPaths, TernResult};

use super::FilesystemStore;

/// A named volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Path to the volume subvolume.
    pub path: PathBuf,
}

/// Creates and lists snapshot-attach source volumes.
#[derive(Debug)]
pub struct VolumeManager<'a> {
    store: &'a FilesystemStore,
    paths: &'a TernPaths,
}

impl<'a> VolumeManager<'a> {
    /// Manage the volumes of `store`.
    #[must_use]
    pub fn new(store: &'a FilesystemStore, paths: &'a TernPaths) -> Self {
        Self { store, paths }
    }

    /// Create a new, empty volume.
    ///
    /// # Errors
    ///
    /// Returns [`tern_common::TernError::InvalidName`] for a bad name and
    /// [`tern_common::TernError::Create`] if the volume already exists.
    pub async fn create(&self, name: &str) -> TernResult<Volume> {
        let name = ContainerName::new(name)?;
        let path = self
            .store
            .subvolume(self.paths.volume_rel(name.as_str()))
            .await?;

        tracing::info!(volume = %name, path = %path.display(), "Volume created");
        Ok(Volume {
            name: name.as_str().to_string(),
            path,
        })
    }

    /// Check whether a volume exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.store.exists(self.paths.volume_rel(name))
    }

    /// List existing volumes, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store root cannot be read.
    pub fn list(&self) -> TernResult<Vec<Volume>> {
        let mut volumes = Vec::new();

        for entry in std::fs::read_dir(self.store.root())? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_prefix(VOLUME_PREFIX)) else {
                continue;
            };
            if !entry.file_type()?.is_dir() {
                continue;
            }
            volumes.push(Volume {
                name: name.to_string(),
                path: entry.path(),
            });
        }

        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(count = volumes.len(), "Listed volumes");
        Ok(volumes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::filesystem::DirectoryDriver;
    use tern_common::TernError;

    #[tokio::test]
    async fn create_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TernPaths::sandboxed(dir.path());
        let store = FilesystemStore::init(&paths.root, Arc::new(DirectoryDriver))
            .await
            .unwrap();
        std::fs::create_dir(paths.root.join("base")).unwrap();

        let volumes = VolumeManager::new(&store, &paths);
        let data = volumes.create("data").await.unwrap();
        volumes.create("cache").await.unwrap();

        assert_eq!(data.path, paths.root.join(".tern-snapshot-data"));
        assert!(volumes.exists("data"));
        assert!(!volumes.exists("base"));

        let names: Vec<_> = volumes.list().unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, ["cache", "data"]);
    }

    #[tokio::test]
    async fn duplicate_and_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TernPaths::sandboxed(dir.path());
        let store = FilesystemStore::init(&paths.root, Arc::new(DirectoryDriver))
            .await
            .unwrap();
        let volumes = VolumeManager::new(&store, &paths);

        volumes.create("data").await.unwrap();
        assert!(matches!(
            volumes.create("data").await.unwrap_err(),
            TernError::Create { .. }
        ));
        assert!(matches!(
            volumes.create("../data").await.unwrap_err(),
            TernError::InvalidName { .. }
        ));
    }
}
