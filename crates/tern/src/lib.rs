//! # Tern Container Runtime
//!
//! Tern runs containers as systemd-nspawn machines on copy-on-write
//! snapshots.
//!
//! ## Features
//!
//! - **Images**: btrfs subvolumes bootstrapped with pacstrap or pulled from
//!   archives
//! - **Containers**: writable snapshots of an image, with host binds and
//!   snapshotted volumes
//! - **Units**: one shared `tern@.service` template for every container
//! - **Networking**: containers join a host bridge through a veth pair
//!
//! ## Usage
//!
//! ```no_run
//! use tern::runtime::{RunRequest, Runtime, RuntimeConfig, run};
//! use tern_common::ContainerName;
//!
//! # async fn example() -> tern_common::TernResult<()> {
//! let runtime = Runtime::open(RuntimeConfig::default()).await?;
//! runtime.install().await?;
//!
//! let mut request = RunRequest::new(ContainerName::new("base")?);
//! request.container = Some(ContainerName::new("web")?);
//! request.binds.push("/srv/www:/var/www".parse()?);
//!
//! let container = run(&runtime, request).await?;
//! container.attach().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod filesystem;
pub mod runtime;
pub mod supervisor;
pub mod unit;

pub use runtime::{Container, Runtime};
