//! Installed unit files.

use std::path::{Path, PathBuf};

use tern_common::{MachineId, TernError, TernPaths, TernResult, write_atomic};

use super::templates::{Template, render};
use crate::runtime::BindSpec;

/// File name of the per-instance machine identity drop-in.
const ENVIRONMENT_DROPIN: &str = "machine-id.conf";

/// Owns the single `tern@.service` install slot and its per-instance files.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    paths: TernPaths,
}

impl UnitRegistry {
    /// Registry over the configured unit and settings directories.
    #[must_use]
    pub const fn new(paths: TernPaths) -> Self {
        Self { paths }
    }

    /// Location of the shared unit.
    #[must_use]
    pub fn unit_path(&self) -> PathBuf {
        self.paths.unit_file()
    }

    /// Whether the shared unit is installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.unit_path().is_file()
    }

    /// Render and install the shared unit, replacing any previous install.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Template`] for bad parameters and
    /// [`TernError::UnitIo`] if the write fails.
    pub fn install(&self, bridge: &str, root_prefix: &str) -> TernResult<PathBuf> {
        let unit = render(&Template::Unit {
            bridge,
            root_prefix,
        })?;
        let path = self.unit_path();
        write_unit(&path, &unit)?;

        tracing::info!(path = %path.display(), bridge, "Unit installed");
        Ok(path)
    }

    /// Delete the shared unit.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::UnitIo`] if no unit is installed or the delete
    /// fails.
    pub fn remove(&self) -> TernResult<()> {
        let path = self.unit_path();
        std::fs::remove_file(&path).map_err(|source| TernError::UnitIo {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "Unit removed");
        Ok(())
    }

    /// Write the machine identity drop-in for `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::UnitIo`] if the write fails.
    pub fn write_environment(&self, instance: &str, machine_id: &MachineId) -> TernResult<PathBuf> {
        let text = render(&Template::Environment { machine_id })?;
        let path = self.environment_path(instance);
        write_unit(&path, &text)?;

        tracing::debug!(instance, path = %path.display(), "Machine identity recorded");
        Ok(path)
    }

    /// Read back the machine identity of `instance`, if one was written.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::UnitIo`] if the drop-in exists but cannot be read.
    pub fn read_environment(&self, instance: &str) -> TernResult<Option<MachineId>> {
        let path = self.environment_path(instance);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(TernError::UnitIo { path, source }),
        };

        Ok(text
            .lines()
            .filter_map(|line| line.trim().strip_prefix("Environment="))
            .map(|value| value.trim_matches('"'))
            .filter_map(|value| value.strip_prefix("MACHINE_ID="))
            .find_map(|id| MachineId::parse(id).ok()))
    }

    /// Write the settings file holding the binds of `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Template`] for unusable binds and
    /// [`TernError::UnitIo`] if the write fails.
    pub fn write_settings(&self, instance: &str, binds: &[BindSpec]) -> TernResult<PathBuf> {
        let text = render(&Template::Settings { binds })?;
        let path = self.paths.settings_file(instance);
        write_unit(&path, &text)?;

        tracing::debug!(instance, binds = binds.len(), path = %path.display(), "Settings written");
        Ok(path)
    }

    fn environment_path(&self, instance: &str) -> PathBuf {
        self.paths.unit_dropin_dir(instance).join(ENVIRONMENT_DROPIN)
    }
}

fn write_unit(path: &Path, contents: &str) -> TernResult<()> {
    write_atomic(path, contents.as_bytes()).map_err(|source| TernError::UnitIo {
        path: path.to_path_buf(),
        source,
    })
}
