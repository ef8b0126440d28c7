//! Runtime configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tern_common::{TernError, TernPaths, TernResult};

use crate::filesystem::DriverKind;

/// Default host bridge.
pub const DEFAULT_BRIDGE: &str = "tern0";

/// Default resolver used while build steps run.
pub const DEFAULT_NAMESERVER: &str = "8.8.8.8";

/// Default supervisor call timeout in seconds.
pub const DEFAULT_TIMEOUT: u64 = 30;

/// Runtime configuration options.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Paths for runtime data.
    pub paths: TernPaths,
    /// Copy-on-write driver for the store.
    pub driver: DriverKind,
    /// Host bridge containers join.
    pub bridge: String,
    /// Bridge address in CIDR form, if the host routes for containers.
    pub bridge_address: Option<String>,
    /// Resolver written for build steps.
    pub nameserver: String,
    /// Supervisor call timeout (seconds).
    pub timeout: u64,
    /// Attach session timeout (seconds), unlimited when unset.
    pub attach_timeout: Option<u64>,
    /// Build step timeout (seconds), unlimited when unset.
    pub build_timeout: Option<u64>,
    /// Base URL of pre-built image archives.
    pub image_base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paths: TernPaths::new(),
            driver: DriverKind::default(),
            bridge: DEFAULT_BRIDGE.to_string(),
            bridge_address: None,
            nameserver: DEFAULT_NAMESERVER.to_string(),
            timeout: DEFAULT_TIMEOUT,
            attach_timeout: None,
            build_timeout: None,
            image_base_url: tern_image::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load a configuration file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> TernResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TernError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml(&text).map_err(|e| TernError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Parse a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Config`] on invalid TOML or unknown keys.
    pub fn from_toml(text: &str) -> TernResult<Self> {
        let file: FileConfig = toml::from_str(text).map_err(|e| TernError::Config {
            message: e.message().to_string(),
        })?;
        Ok(file.apply(Self::default()))
    }

    /// Set the store root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths.root = root.into();
        self
    }

    /// Replace every path at once.
    #[must_use]
    pub fn with_paths(mut self, paths: TernPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set the copy-on-write driver.
    #[must_use]
    pub const fn with_driver(mut self, driver: DriverKind) -> Self {
        self.driver = driver;
        self
    }

    /// Set the host bridge.
    #[must_use]
    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = bridge.into();
        self
    }

    /// Set the build step resolver.
    #[must_use]
    pub fn with_nameserver(mut self, nameserver: impl Into<String>) -> Self {
        self.nameserver = nameserver.into();
        self
    }

    /// Set the supervisor call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the attach session timeout.
    #[must_use]
    pub const fn with_attach_timeout(mut self, timeout: Option<u64>) -> Self {
        self.attach_timeout = timeout;
        self
    }

    /// Set the build step timeout.
    #[must_use]
    pub const fn with_build_timeout(mut self, timeout: Option<u64>) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Supervisor call timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Attach session timeout as a [`Duration`].
    #[must_use]
    pub fn attach_timeout(&self) -> Option<Duration> {
        self.attach_timeout.map(Duration::from_secs)
    }

    /// Build step timeout as a [`Duration`].
    #[must_use]
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout.map(Duration::from_secs)
    }
}

/// On-disk form of [`RuntimeConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    root: Option<PathBuf>,
    unit_dir: Option<PathBuf>,
    settings_dir: Option<PathBuf>,
    network_dir: Option<PathBuf>,
    driver: Option<DriverKind>,
    bridge: Option<String>,
    bridge_address: Option<String>,
    nameserver: Option<String>,
    timeout: Option<u64>,
    attach_timeout: Option<u64>,
    build_timeout: Option<u64>,
    image_base_url: Option<String>,
}

impl FileConfig {
    fn apply(self, mut config: RuntimeConfig) -> RuntimeConfig {
        if let Some(root) = self.root {
            config.paths.root = root;
        }
        if let Some(dir) = self.unit_dir {
            config.paths.unit_dir = dir;
        }
        if let Some(dir) = self.settings_dir {
            config.paths.settings_dir = dir;
        }
        if let Some(dir) = self.network_dir {
            config.paths.network_dir = dir;
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(bridge) = self.bridge {
            config.bridge = bridge;
        }
        if let Some(nameserver) = self.nameserver {
            config.nameserver = nameserver;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(url) = self.image_base_url {
            config.image_base_url = url;
        }
        config.bridge_address = self.bridge_address.or(config.bridge_address);
        config.attach_timeout = self.attach_timeout.or(config.attach_timeout);
        config.build_timeout = self.build_timeout.or(config.build_timeout);
        config
    }
}
