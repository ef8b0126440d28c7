//! Process supervisor control.
//!
//! The supervisor runs and monitors containers once their unit is active.
//! Tern only asks it to reload, enable and start units, to open login
//! sessions, and to run one-off scripts inside a container tree.

mod session;
mod systemd;

use std::path::Path;

use async_trait::async_trait;
use tern_common::TernResult;

pub use session::{exit_code, run_interactive};
pub use systemd::SystemdSupervisor;

/// Calls into the process supervisor.
#[async_trait]
pub trait Supervisor: Send + Sync + std::fmt::Debug {
    /// Reload unit definitions after they changed on disk.
    async fn reload(&self) -> TernResult<()>;

    /// Mark `unit` for activation at boot.
    async fn enable(&self, unit: &str) -> TernResult<()>;

    /// Request that `unit` starts. Returns once the request is queued.
    async fn start(&self, unit: &str) -> TernResult<()>;

    /// Open an interactive session in `machine` and return its exit status.
    async fn attach(&self, machine: &str) -> TernResult<i32>;

    /// Run the shell `script` inside the tree at `root` without booting it
    /// and return its exit status. The script is never written into the
    /// tree.
    async fn run_offline(&self, root: &Path, script: &str) -> TernResult<i32>;
}
