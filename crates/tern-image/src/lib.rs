//! # tern-image
//!
//! Fetching of pre-built Tern images.
//!
//! Images are published as `<base-url>/<image>.tar.bz2` archives of a
//! bootstrapped root filesystem. Fetching streams the archive next to the
//! destination, unpacks it with the system `tar` and removes the archive.

#![warn(missing_docs)]

pub mod fetch;

pub use fetch::{ArchiveFetcher, DEFAULT_BASE_URL};
