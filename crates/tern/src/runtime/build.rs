//! Build steps.
//!
//! A build step runs inside a container tree without booting it. Each step
//! is rendered into a wrapper script and handed to the supervisor's offline
//! runner.

use std::fmt;
use std::str::FromStr;

use tern_common::{TernError, TernResult};

use super::Container;
use crate::unit::{Template, render};

/// Resolver file the wrapper points at while a step runs.
const RESOLV_CONF: &str = "/run/systemd/resolve/resolv.conf";

/// One step of an image or container build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    /// Enable services for boot-time activation.
    Enable(Vec<String>),
    /// Run a shell command.
    Run(String),
}

impl BuildStep {
    /// Step enabling `services`.
    pub fn enable<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enable(services.into_iter().map(Into::into).collect())
    }

    /// Step running `command`.
    pub fn run(command: impl Into<String>) -> Self {
        Self::Run(command.into())
    }

    /// Build a step from a directive (`ENABLE` or `RUN`) and its payload.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Parse`] for an unknown directive or an empty
    /// payload.
    pub fn parse(directive: &str, payload: &str) -> TernResult<Self> {
        let payload = payload.trim();
        let invalid = || TernError::Parse {
            value: format!("{directive} {payload}"),
            expected: "ENABLE <services> or RUN <command>",
        };

        if payload.is_empty() {
            return Err(invalid());
        }

        if directive.eq_ignore_ascii_case("enable") {
            Ok(Self::enable(payload.split_whitespace()))
        } else if directive.eq_ignore_ascii_case("run") {
            Ok(Self::run(payload))
        } else {
            Err(invalid())
        }
    }

    /// Shell command the step runs.
    fn payload(&self) -> Result<String, String> {
        match self {
            Self::Enable(services) => {
                if services.is_empty() {
                    return Err("no services to enable".to_string());
                }
                if let Some(bad) = services.iter().find(|s| !is_unit_name(s)) {
                    return Err(format!("invalid service name {bad:?}"));
                }
                Ok(format!("systemctl enable {}", services.join(" ")))
            }
            Self::Run(command) => Ok(command.clone()),
        }
    }
}

impl FromStr for BuildStep {
    type Err = TernError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (directive, payload) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        Self::parse(directive, payload)
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable(services) => write!(f, "ENABLE {}", services.join(" ")),
            Self::Run(command) => write!(f, "RUN {command}"),
        }
    }
}

/// Unit names limited to characters no shell interprets.
fn is_unit_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':'))
}

/// Run step `index` of a sequence inside `container`.
pub(crate) async fn execute(container: &Container, index: usize, step: &BuildStep) -> TernResult<()> {
    let fail = |status: i32| TernError::BuildStep {
        container: container.name().to_string(),
        index,
        step: step.to_string(),
        status,
    };

    let payload = step.payload().map_err(|reason| TernError::Template {
        template: "build-step",
        reason,
    })?;
    let script = render(&Template::BuildStep {
        payload: &payload,
        nameserver: container.nameserver(),
        resolv_conf: RESOLV_CONF,
    })?;

    tracing::info!(container = %container.name(), index, step = %step, "Running build step");
    let status = container
        .supervisor()
        .run_offline(container.root(), &script)
        .await?;

    if status == 0 {
        tracing::debug!(container = %container.name(), index, "Build step finished");
        Ok(())
    } else {
        Err(fail(status))
    }
}
