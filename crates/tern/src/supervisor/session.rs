//! Interactive child processes.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::signal::unix::{SignalKind, signal};

/// Run `command` on the caller's terminal until it exits.
///
/// SIGINT, SIGTERM and SIGHUP received meanwhile are forwarded to the child
/// so it can end the session itself. When `deadline` passes the child is
/// killed. Returns the child's exit code, or `128 + signal` if a signal
/// ended it.
pub async fn run_interactive(mut command: Command, deadline: Option<Duration>) -> io::Result<i32> {
    let mut child = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;
    let pid = child.id();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let expired = async {
        match deadline {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    loop {
        let received = tokio::select! {
            status = child.wait() => return Ok(exit_code(status?)),
            _ = sigint.recv() => libc::SIGINT,
            _ = sigterm.recv() => libc::SIGTERM,
            _ = sighup.recv() => libc::SIGHUP,
            () = &mut expired => break,
        };
        forward(pid, received);
    }

    tracing::warn!(pid, ?deadline, "Session deadline reached, killing it");
    child.start_kill()?;
    Ok(exit_code(child.wait().await?))
}

/// Exit code of a finished process.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(-1, |signal| 128 + signal))
}

fn forward(pid: Option<u32>, signal: i32) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    tracing::debug!(pid, signal, "Forwarding signal to session");

    // SAFETY: kill(2) has no memory-safety preconditions; pid is the
    // child we spawned and have not reaped yet.
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, signal) };
    if rc != 0 {
        tracing::debug!(pid, signal, error = %io::Error::last_os_error(), "Signal not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn passes_exit_status_through() {
        assert_eq!(run_interactive(sh("exit 0"), None).await.unwrap(), 0);
        assert_eq!(run_interactive(sh("exit 3"), None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn deadline_kills_the_session() {
        let code = run_interactive(sh("sleep 30"), Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(code, 128 + libc::SIGKILL);
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let command = Command::new("/nonexistent/program");
        assert!(run_interactive(command, None).await.is_err());
    }
}
