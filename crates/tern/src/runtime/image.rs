//! Image creation.
//!
//! An image is a subvolume populated once, either by the bootstrap tool
//! followed by the baseline build steps, or from a pre-built archive.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tern_common::id::MACHINE_ID_PLACEHOLDER;
use tern_common::{ContainerName, TOOL_ENV, TernError, TernResult, write_atomic};
use tern_image::ArchiveFetcher;

use super::{BuildStep, Runtime};
use crate::unit::{Template, render};

/// Packages installed into every bootstrapped image.
pub const BASE_PACKAGES: &[&str] = &[
    "bash",
    "bzip2",
    "coreutils",
    "diffutils",
    "file",
    "filesystem",
    "findutils",
    "gawk",
    "gcc-libs",
    "gettext",
    "glibc",
    "grep",
    "gzip",
    "iproute2",
    "iputils",
    "less",
    "libutil-linux",
    "licenses",
    "logrotate",
    "nano",
    "pacman",
    "procps-ng",
    "psmisc",
    "sed",
    "shadow",
    "sysfsutils",
    "tar",
    "texinfo",
    "util-linux",
    "vi",
    "which",
];

/// Populates an empty root filesystem.
#[async_trait]
pub trait Bootstrapper: Send + Sync + std::fmt::Debug {
    /// Install a base system for `image` into the existing directory `dest`.
    async fn populate(&self, image: &str, dest: &Path) -> TernResult<()>;
}

/// Bootstraps Arch Linux trees with `pacstrap`.
#[derive(Debug, Clone)]
pub struct Pacstrap {
    program: String,
}

impl Pacstrap {
    /// Use `pacstrap` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "pacstrap".to_string(),
        }
    }
}

impl Default for Pacstrap {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bootstrapper for Pacstrap {
    async fn populate(&self, image: &str, dest: &Path) -> TernResult<()> {
        let fail = |reason: String| TernError::Bootstrap {
            image: image.to_string(),
            reason,
        };

        tracing::info!(image, dest = %dest.display(), "Bootstrapping");
        let status = tokio::process::Command::new(&self.program)
            .arg("-c")
            .arg("-d")
            .arg(dest)
            .args(BASE_PACKAGES)
            .env_clear()
            .envs(TOOL_ENV.iter().copied())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| fail(format!("cannot run {}: {e}", self.program)))?;

        if status.success() {
            Ok(())
        } else {
            Err(fail(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Steps applied to every freshly bootstrapped image.
#[must_use]
pub fn baseline_steps() -> Vec<BuildStep> {
    vec![
        BuildStep::enable(["systemd-networkd", "systemd-resolved"]),
        BuildStep::run("rm -f /etc/resolv.conf"),
        BuildStep::run("ln -sf /run/systemd/resolve/resolv.conf /etc/resolv.conf"),
    ]
}

/// Creates images in the store.
#[derive(Debug)]
pub struct ImageBuilder<'a> {
    runtime: &'a Runtime,
    bootstrapper: Arc<dyn Bootstrapper>,
}

impl<'a> ImageBuilder<'a> {
    /// Builder using `bootstrapper` to populate new images.
    #[must_use]
    pub fn new(runtime: &'a Runtime, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        Self {
            runtime,
            bootstrapper,
        }
    }

    /// Bootstrap a new image.
    ///
    /// Creates the subvolume, populates it, applies the baseline steps,
    /// writes the machine identity marker and the client network
    /// descriptor. A failure leaves the subvolume in place.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub async fn build(&self, image: &ContainerName) -> TernResult<()> {
        let paths = self.runtime.paths();
        let root = self
            .runtime
            .store()
            .subvolume(paths.image_rel(image.as_str()))
            .await?;

        let result = self.compose(image, &root).await;
        if result.is_err() {
            tracing::info!(
                image = %image,
                path = %root.display(),
                "Image build failed, subvolume left in place"
            );
        } else {
            tracing::info!(image = %image, path = %root.display(), "Image built");
        }
        result
    }

    async fn compose(&self, image: &ContainerName, root: &Path) -> TernResult<()> {
        self.bootstrapper.populate(image.as_str(), root).await?;

        // nspawn refuses a tree whose machine-id holds the placeholder.
        self.runtime
            .image(image)
            .build_all(&baseline_steps())
            .await?;

        write_machine_id_marker(root)?;
        tern_network::create_client_network(root, &self.runtime.config().bridge)?;
        Ok(())
    }

    /// Create the image `name` from the pre-built archive of `image`.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Create`] if the subvolume exists and
    /// [`TernError::Fetch`] if the download or extraction fails.
    pub async fn pull(&self, image: &str, name: &ContainerName) -> TernResult<()> {
        let root = self
            .runtime
            .store()
            .subvolume(self.runtime.paths().image_rel(name.as_str()))
            .await?;

        let fetcher = ArchiveFetcher::new(self.runtime.config().image_base_url.clone());
        if let Err(e) = fetcher.fetch(image, &root).await {
            tracing::info!(
                image = %name,
                path = %root.display(),
                "Pull failed, subvolume left in place"
            );
            return Err(e);
        }

        tracing::info!(image, name = %name, "Image pulled");
        Ok(())
    }
}

/// Write the placeholder the unit swaps for the real identity at start.
fn write_machine_id_marker(root: &Path) -> TernResult<()> {
    let marker = render(&Template::MachineId {
        machine_id: MACHINE_ID_PLACEHOLDER,
    })?;
    let path = root.join("etc/machine-id");
    write_atomic(&path, marker.as_bytes()).map_err(|e| TernError::Create {
        path,
        reason: e.to_string(),
    })
}
