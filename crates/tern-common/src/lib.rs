//! # tern-common
//!
//! Shared utilities and types for the Tern container runtime.
//!
//! This crate provides common functionality used across all Tern crates:
//! - Container name validation and machine identities
//! - Standard filesystem paths
//! - Atomic file replacement
//! - The fixed environment of external tools
//! - Common error types

#![warn(missing_docs)]

pub mod atomic;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;

pub use atomic::write_atomic;
pub use env::TOOL_ENV;
pub use error::{TernError, TernResult};
pub use id::{ContainerName, MachineId};
pub use paths::TernPaths;
