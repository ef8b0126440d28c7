//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tern_common::{ContainerName, TernError, TernResult};

use crate::filesystem::DriverKind;
use crate::runtime::{
    BindSpec, ImageBuilder, Pacstrap, RunRequest, Runtime, RuntimeConfig, SnapshotAttach,
};

/// Tern - containers on btrfs snapshots and systemd-nspawn
#[derive(Debug, Parser)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory of images and containers
    #[arg(long, global = true, env = "TERN_ROOT")]
    pub root: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true, env = "TERN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Copy-on-write driver
    #[arg(long, global = true, value_enum)]
    pub driver: Option<DriverKind>,

    /// Host bridge containers join
    #[arg(long, global = true)]
    pub bridge: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install the container unit and the host bridge
    Init,

    /// Remove the container unit
    Uninstall,

    /// Build a new image with pacstrap
    Bootstrap {
        /// Image name
        image: ContainerName,
    },

    /// Create an image from a pre-built archive
    Pull {
        /// Archive to fetch
        image: ContainerName,

        /// Name of the new image (default: the archive name)
        name: Option<ContainerName>,
    },

    /// Create a volume for --snapshot
    Volume {
        /// Volume name
        name: ContainerName,
    },

    /// Create a container from an image and start it
    Run {
        /// Bind a host directory into the container
        #[arg(long = "bind", value_name = "HOST:CONTAINER")]
        binds: Vec<BindSpec>,

        /// Snapshot a volume into the container
        #[arg(long = "snapshot", value_name = "NAME:PATH")]
        snapshots: Vec<SnapshotAttach>,

        /// Image to create the container from
        image: ContainerName,

        /// Container name (default: the image name)
        container: Option<ContainerName>,
    },

    /// Open a login session in a running container
    Attach {
        /// Container name
        container: ContainerName,
    },
}

impl Cli {
    /// Resolve the runtime configuration: file first, then flags.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Config`] if the configuration file is unusable.
    pub fn runtime_config(&self) -> TernResult<RuntimeConfig> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::default(),
        };

        if let Some(root) = &self.root {
            config = config.with_root(root.clone());
        }
        if let Some(driver) = self.driver {
            config = config.with_driver(driver);
        }
        if let Some(bridge) = &self.bridge {
            config = config.with_bridge(bridge.clone());
        }
        Ok(config)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns the first error of the command.
    pub async fn execute(self) -> Result<()> {
        let config = self.runtime_config()?;
        let runtime = Runtime::open(config).await?;

        match self.command {
            Commands::Init => {
                runtime.install().await?;
                println!("Unit installed at {}", runtime.units().unit_path().display());
            }

            Commands::Uninstall => match runtime.uninstall().await {
                Ok(()) => println!("Unit removed"),
                Err(TernError::UnitIo { path, source }) => {
                    tracing::warn!(path = %path.display(), error = %source, "No unit to remove");
                }
                Err(e) => return Err(e.into()),
            },

            Commands::Bootstrap { image } => {
                ImageBuilder::new(&runtime, Arc::new(Pacstrap::new()))
                    .build(&image)
                    .await?;
                println!("Image {image} ready");
            }

            Commands::Pull { image, name } => {
                let name = name.unwrap_or_else(|| image.clone());
                ImageBuilder::new(&runtime, Arc::new(Pacstrap::new()))
                    .pull(image.as_str(), &name)
                    .await?;
                println!("Image {name} ready");
            }

            Commands::Volume { name } => {
                let volume = runtime.volumes().create(name.as_str()).await?;
                println!("Volume {} created at {}", volume.name, volume.path.display());
            }

            Commands::Run {
                binds,
                snapshots,
                image,
                container,
            } => {
                let request = RunRequest {
                    image,
                    container,
                    binds,
                    snapshots,
                };
                let container = crate::runtime::run(&runtime, request).await?;
                println!("Container {} running", container.name());
            }

            Commands::Attach { container } => {
                runtime.container(&container).attach().await?;
            }
        }

        Ok(())
    }
}
