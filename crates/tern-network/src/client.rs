//! Container-side network descriptor.
//!
//! Written into an image so every container snapshot brings up its `host0`
//! veth end with DHCP from the bridge it was attached to.

use std::path::{Path, PathBuf};

use tern_common::{TernError, TernResult};

use crate::validate_interface_name;

/// Descriptor location relative to the image root.
pub const CLIENT_DESCRIPTOR: &str = "etc/systemd/network/80-container-host0.network";

/// Client side of a bridged container network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientNetwork {
    /// Host bridge the container's veth is attached to.
    bridge: String,
}

impl ClientNetwork {
    /// Describe the client network for `bridge`.
    pub fn new(bridge: &str) -> TernResult<Self> {
        validate_interface_name(bridge)?;
        Ok(Self {
            bridge: bridge.to_string(),
        })
    }

    /// Bridge name.
    #[must_use]
    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// Render the `.network` descriptor.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[Match]\n\
             Virtualization=container\n\
             Name=host0\n\
             \n\
             [Network]\n\
             Description=Container uplink via bridge {}\n\
             DHCP=yes\n\
             LinkLocalAddressing=yes\n\
             \n\
             [DHCP]\n\
             UseTimezone=yes\n",
            self.bridge
        )
    }

    /// Write the descriptor below `root` (an image or container root).
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Network`] if `root` is missing or the write fails.
    pub fn write(&self, root: &Path) -> TernResult<PathBuf> {
        let path = root.join(CLIENT_DESCRIPTOR);

        if !root.is_dir() {
            return Err(TernError::Network {
                path,
                reason: format!("root {} is not a directory", root.display()),
            });
        }

        tern_common::write_atomic(&path, self.render().as_bytes()).map_err(|e| {
            TernError::Network {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            path = %path.display(),
            bridge = %self.bridge,
            "Client network descriptor written"
        );
        Ok(path)
    }
}

/// Write the client descriptor for `bridge` into the image at `root`.
///
/// # Errors
///
/// Returns [`TernError::Network`] on an invalid bridge or failed write.
pub fn create_client_network(root: &Path, bridge: &str) -> TernResult<PathBuf> {
    ClientNetwork::new(bridge)
        .map_err(|e| TernError::Network {
            path: root.join(CLIENT_DESCRIPTOR),
            reason: e.to_string(),
        })?
        .write(root)
}
