//! Runtime context shared by every operation.

use std::sync::Arc;

use tern_common::{ContainerName, TernPaths, TernResult};
use tern_network::HostBridge;

use super::{Container, RuntimeConfig};
use crate::filesystem::{FilesystemStore, VolumeManager};
use crate::supervisor::{Supervisor, SystemdSupervisor};
use crate::unit::UnitRegistry;

/// Configuration, store, unit registry and supervisor of one invocation.
#[derive(Debug, Clone)]
pub struct Runtime {
    config: RuntimeConfig,
    store: FilesystemStore,
    units: UnitRegistry,
    supervisor: Arc<dyn Supervisor>,
}

impl Runtime {
    /// Open the runtime with the systemd supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`tern_common::TernError::Init`] if the store cannot be
    /// opened.
    pub async fn open(config: RuntimeConfig) -> TernResult<Self> {
        let supervisor = SystemdSupervisor::new()
            .with_timeout(config.timeout())
            .with_attach_timeout(config.attach_timeout())
            .with_offline_timeout(config.build_timeout());
        Self::with_supervisor(config, Arc::new(supervisor)).await
    }

    /// Open the runtime with a specific supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`tern_common::TernError::Init`] if the store cannot be
    /// opened.
    pub async fn with_supervisor(
        config: RuntimeConfig,
        supervisor: Arc<dyn Supervisor>,
    ) -> TernResult<Self> {
        let store = FilesystemStore::init(&config.paths.root, config.driver.driver()).await?;
        let units = UnitRegistry::new(config.paths.clone());
        Ok(Self {
            config,
            store,
            units,
            supervisor,
        })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the configured paths.
    #[must_use]
    pub const fn paths(&self) -> &TernPaths {
        &self.config.paths
    }

    /// Get the filesystem store.
    #[must_use]
    pub const fn store(&self) -> &FilesystemStore {
        &self.store
    }

    /// Get the unit registry.
    #[must_use]
    pub const fn units(&self) -> &UnitRegistry {
        &self.units
    }

    /// Get the supervisor.
    #[must_use]
    pub fn supervisor(&self) -> Arc<dyn Supervisor> {
        Arc::clone(&self.supervisor)
    }

    /// Named volumes of the store.
    #[must_use]
    pub fn volumes(&self) -> VolumeManager<'_> {
        VolumeManager::new(&self.store, &self.config.paths)
    }

    /// Handle on the container `name`.
    #[must_use]
    pub fn container(&self, name: &ContainerName) -> Container {
        self.handle(name, self.config.paths.container(name.as_str()))
    }

    /// Handle on the image `name`, for running build steps against it.
    #[must_use]
    pub fn image(&self, name: &ContainerName) -> Container {
        self.handle(name, self.config.paths.image(name.as_str()))
    }

    fn handle(&self, name: &ContainerName, root: std::path::PathBuf) -> Container {
        Container::new(
            name.clone(),
            root,
            self.units.clone(),
            self.supervisor(),
            self.config.nameserver.clone(),
        )
    }

    /// Install the shared unit and the host bridge descriptors.
    ///
    /// # Errors
    ///
    /// Returns the first template, unit or network error.
    pub async fn install(&self) -> TernResult<()> {
        let prefix = self.config.paths.container_prefix();
        self.units.install(&self.config.bridge, &prefix)?;

        let mut bridge = HostBridge::new(&self.config.bridge)?;
        if let Some(address) = &self.config.bridge_address {
            bridge = bridge.with_address(address)?;
        }
        bridge.write(&self.config.paths.network_dir)?;

        self.supervisor.reload().await
    }

    /// Remove the shared unit.
    ///
    /// # Errors
    ///
    /// Returns [`tern_common::TernError::UnitIo`] if no unit is installed,
    /// or the supervisor error from reloading.
    pub async fn uninstall(&self) -> TernResult<()> {
        self.units.remove()?;
        self.supervisor.reload().await
    }
}
