//! # tern-network
//!
//! Declarative network descriptors for Tern containers.
//!
//! Tern never touches the network data plane. It writes systemd-networkd
//! descriptors: one inside each image so the container configures its
//! `host0` uplink, and a bridge pair on the host that `systemd-nspawn
//! --network-bridge` attaches container veths to.

#![warn(missing_docs)]

pub mod bridge;
pub mod client;

pub use bridge::HostBridge;
pub use client::{ClientNetwork, create_client_network};

use tern_common::{TernError, TernResult};

/// Maximum length of a Linux interface name.
pub const IFNAMSIZ: usize = 15;

/// Check that `name` can name a network interface.
///
/// # Errors
///
/// Returns [`TernError::Config`] for empty, overlong or non-printable names.
pub fn validate_interface_name(name: &str) -> TernResult<()> {
    let valid = !name.is_empty()
        && name.len() <= IFNAMSIZ
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_graphic() && c != '/' && c != ':');

    if valid {
        Ok(())
    } else {
        Err(TernError::Config {
            message: format!("invalid bridge name {name:?}"),
        })
    }
}
