//! systemd backed supervisor.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tern_common::{TOOL_ENV, TernError, TernResult};
use tokio::process::Command;

use super::Supervisor;
use super::session::{exit_code, run_interactive};

/// Default timeout for supervisor calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where an offline script is bound inside the container.
///
/// nspawn mounts a fresh tmpfs over the container's `/tmp`, so the script
/// is bound in from the host instead of being written into the tree.
const OFFLINE_SCRIPT: &str = "/run/tern-build.sh";

/// Drives systemd through `systemctl`, `machinectl` and `systemd-nspawn`.
#[derive(Debug, Clone)]
pub struct SystemdSupervisor {
    /// Limit for every call except attach.
    timeout: Duration,
    /// Optional limit for attach sessions.
    attach_timeout: Option<Duration>,
    /// Optional limit for offline scripts.
    offline_timeout: Option<Duration>,
    systemctl: PathBuf,
    machinectl: PathBuf,
    nspawn: PathBuf,
}

impl SystemdSupervisor {
    /// Supervisor using the tools from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            attach_timeout: None,
            offline_timeout: None,
            systemctl: PathBuf::from("systemctl"),
            machinectl: PathBuf::from("machinectl"),
            nspawn: PathBuf::from("systemd-nspawn"),
        }
    }

    /// Set the timeout for supervisor calls.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the attach session timeout.
    #[must_use]
    pub const fn with_attach_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attach_timeout = timeout;
        self
    }

    /// Set the offline script timeout. Scripts run unbounded when unset.
    #[must_use]
    pub const fn with_offline_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.offline_timeout = timeout;
        self
    }

    /// Use a specific `systemctl` binary.
    #[must_use]
    pub fn with_systemctl(mut self, program: impl Into<PathBuf>) -> Self {
        self.systemctl = program.into();
        self
    }

    /// Use a specific `systemd-nspawn` binary.
    #[must_use]
    pub fn with_nspawn(mut self, program: impl Into<PathBuf>) -> Self {
        self.nspawn = program.into();
        self
    }

    /// Run `systemctl args...`, mapping a refusal through `reject`.
    async fn systemctl(
        &self,
        args: &[&str],
        reject: impl FnOnce(String) -> TernError,
    ) -> TernResult<()> {
        let operation = format!("systemctl {}", args.join(" "));
        tracing::debug!(command = %operation, "Calling supervisor");

        let mut command = Command::new(&self.systemctl);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(reject(format!("cannot run systemctl: {e}"))),
            Err(_) => {
                return Err(TernError::Timeout {
                    operation,
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(reject(format!(
                "{operation} exited with {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }
}

impl Default for SystemdSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Supervisor for SystemdSupervisor {
    async fn reload(&self) -> TernResult<()> {
        self.systemctl(&["daemon-reload"], |reason| TernError::Activation {
            instance: tern_common::paths::UNIT_FILE_NAME.to_string(),
            reason,
        })
        .await
    }

    async fn enable(&self, unit: &str) -> TernResult<()> {
        self.systemctl(&["enable", unit], |reason| TernError::Activation {
            instance: unit.to_string(),
            reason,
        })
        .await?;
        tracing::info!(unit, "Unit enabled");
        Ok(())
    }

    async fn start(&self, unit: &str) -> TernResult<()> {
        self.systemctl(&["start", "--no-block", unit], |reason| TernError::Start {
            instance: unit.to_string(),
            reason,
        })
        .await?;
        tracing::info!(unit, "Unit start requested");
        Ok(())
    }

    async fn attach(&self, machine: &str) -> TernResult<i32> {
        tracing::debug!(machine, timeout = ?self.attach_timeout, "Opening login session");

        let mut command = Command::new(&self.machinectl);
        command.arg("login").arg(machine);

        run_interactive(command, self.attach_timeout)
            .await
            .map_err(|e| TernError::Attach {
                container: machine.to_string(),
                reason: format!("cannot run machinectl: {e}"),
            })
    }

    async fn run_offline(&self, root: &Path, script: &str) -> TernResult<i32> {
        let staged = stage_script(script)?;
        tracing::debug!(
            root = %root.display(),
            script = %staged.path().display(),
            "Running offline"
        );

        let mut command = Command::new(&self.nspawn);
        command
            .arg("--quiet")
            .arg("--register=no")
            .arg(format!("--directory={}", root.display()))
            .arg(format!("--bind-ro={}:{OFFLINE_SCRIPT}", staged.path().display()))
            .arg("--")
            .arg("/bin/sh")
            .arg(OFFLINE_SCRIPT)
            .env_clear()
            .envs(TOOL_ENV.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let status = match self.offline_timeout {
            Some(limit) => match tokio::time::timeout(limit, command.status()).await {
                Ok(status) => status?,
                Err(_) => {
                    return Err(TernError::Timeout {
                        operation: format!("offline script in {}", root.display()),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => command.status().await?,
        };

        Ok(exit_code(status))
    }
}

/// Write `script` to a host file that lives until the returned guard drops.
fn stage_script(script: &str) -> TernResult<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("tern-build-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(script.as_bytes())?;
    file.flush()?;

    // nspawn splits the bind argument on ':'.
    if file.path().to_string_lossy().contains(':') {
        return Err(TernError::Io(std::io::Error::other(format!(
            "temporary path {} contains ':'",
            file.path().display()
        ))));
    }
    Ok(file)
}
