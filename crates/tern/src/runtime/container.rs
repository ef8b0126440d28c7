//! Container type and operations.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tern_common::{ContainerName, MachineId, TernError, TernResult};

use super::build::{self, BuildStep};
use crate::supervisor::Supervisor;
use crate::unit::UnitRegistry;

/// Host directory bound into a container at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    /// Absolute host path.
    pub host: PathBuf,
    /// Absolute path inside the container.
    pub container: PathBuf,
}

impl FromStr for BindSpec {
    type Err = TernError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TernError::Parse {
            value: value.to_string(),
            expected: "HOST:CONTAINER with absolute paths",
        };

        let (host, container) = value.split_once(':').ok_or_else(invalid)?;
        if !host.starts_with('/') || !container.starts_with('/') || container.contains(':') {
            return Err(invalid());
        }

        Ok(Self {
            host: PathBuf::from(host),
            container: PathBuf::from(container),
        })
    }
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.display(), self.container.display())
    }
}

/// Volume snapshotted into a container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotAttach {
    /// Volume name, resolved to `<root>/.tern-snapshot-<name>`.
    pub source: String,
    /// Destination inside the container, relative to its root.
    pub dest: PathBuf,
}

impl FromStr for SnapshotAttach {
    type Err = TernError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || TernError::Parse {
            value: value.to_string(),
            expected: "NAME:PATH",
        };

        let (source, dest) = value.split_once(':').ok_or_else(invalid)?;
        let source = ContainerName::new(source).map_err(|_| invalid())?;

        let dest: PathBuf = Path::new(dest)
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::CurDir))
            .collect();
        if dest.as_os_str().is_empty()
            || dest.components().any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }

        Ok(Self {
            source: source.as_str().to_string(),
            dest,
        })
    }
}

impl fmt::Display for SnapshotAttach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.source, self.dest.display())
    }
}

/// Handle on one container (or an image while it is being built).
///
/// Setters only record state; nothing touches the host until
/// [`enable`](Self::enable), [`start`](Self::start) or a build step runs.
#[derive(Debug, Clone)]
pub struct Container {
    name: ContainerName,
    root: PathBuf,
    binds: Vec<BindSpec>,
    snapshots: Vec<SnapshotAttach>,
    /// Identity written on the next enable.
    identity: Option<MachineId>,
    units: UnitRegistry,
    supervisor: Arc<dyn Supervisor>,
    nameserver: String,
}

impl Container {
    /// Handle on the tree at `root`.
    #[must_use]
    pub fn new(
        name: ContainerName,
        root: impl Into<PathBuf>,
        units: UnitRegistry,
        supervisor: Arc<dyn Supervisor>,
        nameserver: impl Into<String>,
    ) -> Self {
        Self {
            name,
            root: root.into(),
            binds: Vec::new(),
            snapshots: Vec::new(),
            identity: None,
            units,
            supervisor,
            nameserver: nameserver.into(),
        }
    }

    /// Get the container name.
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Get the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Recorded binds.
    #[must_use]
    pub fn binds(&self) -> &[BindSpec] {
        &self.binds
    }

    /// Recorded snapshot attaches.
    #[must_use]
    pub fn snapshots(&self) -> &[SnapshotAttach] {
        &self.snapshots
    }

    /// Replace the bind list.
    pub fn set_binds(&mut self, binds: Vec<BindSpec>) {
        self.binds = binds;
    }

    /// Replace the snapshot-attach list.
    pub fn set_snapshots(&mut self, snapshots: Vec<SnapshotAttach>) {
        self.snapshots = snapshots;
    }

    /// Record the machine identity [`enable`](Self::enable) writes into the
    /// instance drop-in.
    pub fn set_machine_id(&mut self, machine_id: MachineId) {
        self.identity = Some(machine_id);
    }

    /// Unit instance of this container, `tern@<name>.service`.
    #[must_use]
    pub fn instance_unit(&self) -> String {
        format!("tern@{}.service", self.name)
    }

    /// Whether the root snapshot exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Machine identity recorded for this container.
    ///
    /// # Errors
    ///
    /// Returns an error if the drop-in exists but cannot be read.
    pub fn machine_id(&self) -> TernResult<Option<MachineId>> {
        self.units.read_environment(self.name.as_str())
    }

    pub(crate) fn nameserver(&self) -> &str {
        &self.nameserver
    }

    pub(crate) fn supervisor(&self) -> &dyn Supervisor {
        self.supervisor.as_ref()
    }

    /// Activate the shared unit for this container.
    ///
    /// Writes the settings file holding the binds and the machine identity
    /// drop-in when one was set, reloads the supervisor and enables the
    /// instance. Nothing is written when the unit is not installed.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::ContainerNotFound`] if the root is missing and
    /// [`TernError::Activation`] if the unit is not installed or the
    /// supervisor refuses it.
    pub async fn enable(&self) -> TernResult<()> {
        self.require_root()?;
        let unit = self.instance_unit();

        if !self.units.is_installed() {
            return Err(TernError::Activation {
                instance: unit,
                reason: format!("{} is not installed", self.units.unit_path().display()),
            });
        }

        self.units.write_settings(self.name.as_str(), &self.binds)?;
        if let Some(machine_id) = &self.identity {
            self.units.write_environment(self.name.as_str(), machine_id)?;
        }
        self.supervisor.reload().await?;
        self.supervisor.enable(&unit).await?;

        tracing::info!(container = %self.name, unit, binds = self.binds.len(), "Container enabled");
        Ok(())
    }

    /// Ask the supervisor to start the container.
    ///
    /// Returns once the request is acknowledged, not once the container has
    /// booted.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::ContainerNotFound`] if the root is missing and
    /// [`TernError::Start`] if the supervisor refuses.
    pub async fn start(&self) -> TernResult<()> {
        self.require_root()?;
        let unit = self.instance_unit();
        self.supervisor.start(&unit).await?;

        tracing::info!(container = %self.name, unit, "Container started");
        Ok(())
    }

    /// Open an interactive session, blocking until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::ContainerNotFound`] if the root is missing and
    /// [`TernError::Attach`] if the session fails or exits non-zero.
    pub async fn attach(&self) -> TernResult<()> {
        self.require_root()?;
        tracing::info!(container = %self.name, "Attaching");

        let status = self.supervisor.attach(self.name.as_str()).await?;
        if status != 0 {
            return Err(TernError::Attach {
                container: self.name.to_string(),
                reason: format!("session exited with status {status}"),
            });
        }
        Ok(())
    }

    /// Run one build step inside the container tree.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::BuildStep`] if the step exits non-zero.
    pub async fn build(&self, step: &BuildStep) -> TernResult<()> {
        build::execute(self, 0, step).await
    }

    /// Run build steps in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, indexed by its position.
    pub async fn build_all(&self, steps: &[BuildStep]) -> TernResult<()> {
        for (index, step) in steps.iter().enumerate() {
            build::execute(self, index, step).await?;
        }
        Ok(())
    }

    fn require_root(&self) -> TernResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(TernError::ContainerNotFound {
                name: self.name.to_string(),
            })
        }
    }
}
