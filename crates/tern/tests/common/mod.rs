//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tern::filesystem::DriverKind;
use tern::runtime::{Bootstrapper, Runtime, RuntimeConfig};
use tern::supervisor::Supervisor;
use tern_common::{TernError, TernPaths, TernResult};

/// A supervisor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Reload,
    Enable(String),
    Start(String),
    Attach(String),
    /// Offline run with its wrapper script and the tree's machine-id at the
    /// time, if any.
    Offline {
        root: PathBuf,
        script: String,
        machine_id: Option<String>,
    },
}

/// Supervisor that records calls instead of talking to systemd.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    calls: Mutex<Vec<Call>>,
    offline_statuses: Mutex<VecDeque<i32>>,
    attach_status: i32,
    refuse_enable: bool,
    refuse_start: bool,
}

impl RecordingSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit statuses of successive offline runs; later runs exit 0.
    pub fn with_offline_statuses(self, statuses: &[i32]) -> Self {
        *self.offline_statuses.lock().unwrap() = statuses.iter().copied().collect();
        self
    }

    pub fn with_attach_status(mut self, status: i32) -> Self {
        self.attach_status = status;
        self
    }

    pub fn refusing_enable(mut self) -> Self {
        self.refuse_enable = true;
        self
    }

    pub fn refusing_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Offline scripts in the order they ran.
    pub fn scripts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Offline { script, .. } => Some(script),
                _ => None,
            })
            .collect()
    }

    /// Whether enable or start was ever called.
    pub fn activated(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, Call::Enable(_) | Call::Start(_)))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Supervisor for RecordingSupervisor {
    async fn reload(&self) -> TernResult<()> {
        self.record(Call::Reload);
        Ok(())
    }

    async fn enable(&self, unit: &str) -> TernResult<()> {
        self.record(Call::Enable(unit.to_string()));
        if self.refuse_enable {
            return Err(TernError::Activation {
                instance: unit.to_string(),
                reason: "refused".to_string(),
            });
        }
        Ok(())
    }

    async fn start(&self, unit: &str) -> TernResult<()> {
        self.record(Call::Start(unit.to_string()));
        if self.refuse_start {
            return Err(TernError::Start {
                instance: unit.to_string(),
                reason: "refused".to_string(),
            });
        }
        Ok(())
    }

    async fn attach(&self, machine: &str) -> TernResult<i32> {
        self.record(Call::Attach(machine.to_string()));
        Ok(self.attach_status)
    }

    async fn run_offline(&self, root: &Path, script: &str) -> TernResult<i32> {
        self.record(Call::Offline {
            root: root.to_path_buf(),
            script: script.to_string(),
            machine_id: std::fs::read_to_string(root.join("etc/machine-id")).ok(),
        });
        Ok(self.offline_statuses.lock().unwrap().pop_front().unwrap_or(0))
    }
}

/// Bootstrapper that lays down a tiny tree.
#[derive(Debug, Default)]
pub struct FakeBootstrap {
    pub fail: bool,
    pub populated: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Bootstrapper for FakeBootstrap {
    async fn populate(&self, image: &str, dest: &Path) -> TernResult<()> {
        self.populated.lock().unwrap().push(dest.to_path_buf());
        if self.fail {
            return Err(TernError::Bootstrap {
                image: image.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        std::fs::create_dir_all(dest.join("etc"))?;
        std::fs::create_dir_all(dest.join("tmp"))?;
        std::fs::write(dest.join("etc/os-release"), "ID=arch\n")?;
        Ok(())
    }
}

/// A runtime rooted in a temporary directory with the directory driver.
pub async fn sandbox(supervisor: Arc<RecordingSupervisor>) -> (TempDir, Runtime) {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::default()
        .with_paths(TernPaths::sandboxed(dir.path()))
        .with_driver(DriverKind::Directory);
    let runtime = Runtime::with_supervisor(config, supervisor).await.unwrap();
    (dir, runtime)
}

/// Create an image subvolume with one file in it.
pub async fn seed_image(runtime: &Runtime, image: &str) -> PathBuf {
    let root = runtime.store().subvolume(image).await.unwrap();
    std::fs::create_dir_all(root.join("etc")).unwrap();
    std::fs::write(root.join("etc/hostname"), format!("{image}\n")).unwrap();
    root
}
