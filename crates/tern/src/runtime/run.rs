//! Container creation from an image.

use tern_common::{ContainerName, MachineId, TernError, TernResult};

use super::{BindSpec, Container, Runtime, SnapshotAttach};

/// Everything `run` needs to create and start a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Image to snapshot.
    pub image: ContainerName,
    /// Container name, the image name when unset.
    pub container: Option<ContainerName>,
    /// Host directories bound at start.
    pub binds: Vec<BindSpec>,
    /// Volumes snapshotted into the container.
    pub snapshots: Vec<SnapshotAttach>,
}

impl RunRequest {
    /// Request for a container named after `image`.
    #[must_use]
    pub const fn new(image: ContainerName) -> Self {
        Self {
            image,
            container: None,
            binds: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Name of the container to create.
    #[must_use]
    pub fn container_name(&self) -> &ContainerName {
        self.container.as_ref().unwrap_or(&self.image)
    }
}

/// Create a container from an image and start it.
///
/// The whole filesystem is composed before the unit is touched: a failed
/// snapshot or attach returns before anything is enabled.
///
/// # Errors
///
/// Returns the first filesystem, unit or supervisor error.
pub async fn run(runtime: &Runtime, request: RunRequest) -> TernResult<Container> {
    let name = request.container_name().clone();
    let paths = runtime.paths();
    let store = runtime.store();

    let root = store
        .snapshot(
            paths.image_rel(request.image.as_str()),
            paths.container_rel(name.as_str()),
            false,
        )
        .await?;
    tracing::info!(container = %name, image = %request.image, root = %root.display(), "Container created");

    for attach in &request.snapshots {
        let dest = paths.container_rel(name.as_str()).join(&attach.dest);
        store.resolve(&dest).map_err(|reason| TernError::Snapshot {
            dest: root.join(&attach.dest),
            reason,
        })?;

        if store.exists(&dest) {
            tracing::warn!(
                container = %name,
                dest = %attach.dest.display(),
                "Replacing existing attach destination"
            );
            store.remove(&dest).await?;
        }
        if let Some(parent) = dest.parent() {
            store.create_dir_all(parent).await?;
        }

        store
            .snapshot(paths.volume_rel(&attach.source), &dest, false)
            .await?;
        tracing::debug!(container = %name, attach = %attach, "Volume attached");
    }

    let machine_id = MachineId::generate();
    let mut container = runtime.container(&name);
    container.set_binds(request.binds);
    container.set_snapshots(request.snapshots);
    container.set_machine_id(machine_id.clone());

    container.enable().await?;
    container.start().await?;

    tracing::info!(container = %name, machine_id = %machine_id, "Container running");
    Ok(container)
}
