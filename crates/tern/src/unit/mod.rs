//! Supervisor unit generation.
//!
//! Renders the shared `tern@.service` unit and the small per-instance files
//! around it, and owns their installed copies.

mod registry;
mod templates;

pub use registry::UnitRegistry;
pub use templates::{Template, render};
