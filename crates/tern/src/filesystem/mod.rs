//! Copy-on-write filesystem composition.
//!
//! This module handles:
//! - Image subvolumes and container snapshots
//! - Snapshot-attach source volumes
//! - The btrfs and plain-directory drivers

mod driver;
mod store;
mod volume;

pub use driver::{BtrfsDriver, CowDriver, DirectoryDriver, DriverKind};
pub use store::FilesystemStore;
pub use volume::{Volume, VolumeManager};
