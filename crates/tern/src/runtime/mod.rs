//! Container runtime core.
//!
//! This module ties the filesystem store, the unit registry and the
//! supervisor together into the container lifecycle: image builds, `run`
//! and the [`Container`] handle.

mod build;
mod config;
mod container;
mod context;
mod image;
mod run;

pub use build::BuildStep;
pub use config::{DEFAULT_BRIDGE, DEFAULT_NAMESERVER, DEFAULT_TIMEOUT, RuntimeConfig};
pub use container::{BindSpec, Container, SnapshotAttach};
pub use context::Runtime;
pub use image::{BASE_PACKAGES, Bootstrapper, ImageBuilder, Pacstrap, baseline_steps};
pub use run::{RunRequest, run};
