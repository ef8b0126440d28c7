//! Container names and machine identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TernError, TernResult};

/// Marker written into an image's `/etc/machine-id`.
///
/// The unit's pre-start hook swaps it for the instance's identity.
pub const MACHINE_ID_PLACEHOLDER: &str = "REPLACE_ME";

/// A validated container or image name.
///
/// Names double as subvolume names and unit instance names, so they must:
/// - Be 1-64 characters long
/// - Contain only alphanumeric characters, hyphens, underscores and dots
/// - Start with an alphanumeric character
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Maximum length of a name.
    pub const MAX_LENGTH: usize = 64;

    /// Create a new name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name format is invalid.
    pub fn new(name: impl Into<String>) -> TernResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> TernResult<()> {
        let invalid = || TernError::InvalidName {
            name: name.to_string(),
        };

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid());
        }

        if name.contains("..") {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContainerName {
    type Err = TernError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = TernError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A container's machine identity: 32 lowercase hex characters.
///
/// Generated once when the container is created and never changed after.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineId(String);

impl MachineId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(hex::encode(uuid::Uuid::new_v4().as_bytes()))
    }

    /// Parse an identity read back from disk.
    ///
    /// # Errors
    ///
    /// Returns an error unless the value is exactly 32 hex characters.
    pub fn parse(value: &str) -> TernResult<Self> {
        let value = value.trim();
        if value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(TernError::Parse {
                value: value.to_string(),
                expected: "32 hex characters",
            })
        }
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
