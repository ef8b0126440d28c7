//! Host bridge descriptors.
//!
//! This module renders the `.netdev`/`.network` pair that makes
//! systemd-networkd create the bridge containers are attached to.

use std::path::{Path, PathBuf};

use tern_common::{TernError, TernResult};

use crate::validate_interface_name;

/// Host bridge for container networking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBridge {
    /// Bridge name.
    name: String,
    /// Bridge address in CIDR form, if the host routes for containers.
    address: Option<String>,
}

impl HostBridge {
    /// Describe a bridge without a host address.
    pub fn new(name: &str) -> TernResult<Self> {
        validate_interface_name(name)?;
        Ok(Self {
            name: name.to_string(),
            address: None,
        })
    }

    /// Give the bridge an address and let it serve DHCP and masquerade.
    pub fn with_address(mut self, cidr: &str) -> TernResult<Self> {
        let valid = cidr
            .split_once('/')
            .is_some_and(|(ip, prefix)| {
                ip.parse::<std::net::IpAddr>().is_ok() && prefix.parse::<u8>().is_ok()
            });
        if !valid {
            return Err(TernError::Config {
                message: format!("invalid bridge address {cidr:?}, expected CIDR"),
            });
        }
        self.address = Some(cidr.to_string());
        Ok(self)
    }

    /// Get the bridge name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the `.netdev` descriptor.
    #[must_use]
    pub fn render_netdev(&self) -> String {
        format!("[NetDev]\nName={}\nKind=bridge\n", self.name)
    }

    /// Render the `.network` descriptor.
    #[must_use]
    pub fn render_network(&self) -> String {
        let mut network = format!("[Match]\nName={}\n\n[Network]\n", self.name);
        match &self.address {
            Some(address) => {
                network.push_str(&format!("Address={address}\n"));
                network.push_str("DHCPServer=yes\n");
                network.push_str("IPMasquerade=ipv4\n");
            }
            None => network.push_str("LinkLocalAddressing=no\n"),
        }
        network
    }

    /// Write both descriptors into `network_dir`.
    ///
    /// Returns the written paths, `.netdev` first.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Network`] if either write fails.
    pub fn write(&self, network_dir: &Path) -> TernResult<(PathBuf, PathBuf)> {
        let netdev = network_dir.join(format!("{}.netdev", self.name));
        let network = network_dir.join(format!("{}.network", self.name));

        for (path, contents) in [
            (&netdev, self.render_netdev()),
            (&network, self.render_network()),
        ] {
            tern_common::write_atomic(path, contents.as_bytes()).map_err(|e| {
                TernError::Network {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        tracing::info!(
            bridge = %self.name,
            dir = %network_dir.display(),
            "Host bridge descriptors written"
        );
        Ok((netdev, network))
    }
}
