//! Protocol versioning for safe upgrades.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol version announced in the `connect` handshake.
///
/// Uses semantic versioning: major.minor
/// - Major version bump: breaking changes, incompatible
/// - Minor version bump: additive changes, backward compatible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Current protocol version.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Returns true if this version is compatible with another.
    ///
    /// Major versions must match; any minor version is accepted.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Checks a client version against the server's.
    pub fn check_against(&self, server: &ProtocolVersion) -> Result<(), VersionError> {
        if self.is_compatible_with(server) {
            Ok(())
        } else {
            Err(VersionError::Incompatible {
                client: *self,
                server: *server,
            })
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Errors that can occur with version handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Protocol version {client} not compatible with server version {server}")]
    Incompatible {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let v1_0 = ProtocolVersion::new(1, 0);
        let v1_1 = ProtocolVersion::new(1, 1);
        let v2_0 = ProtocolVersion::new(2, 0);

        assert!(v1_0.is_compatible_with(&v1_1));
        assert!(v1_1.is_compatible_with(&v1_0));
        assert!(!v1_0.is_compatible_with(&v2_0));
    }

    #[test]
    fn test_check_against_reports_both_versions() {
        let err = ProtocolVersion::new(2, 3)
            .check_against(&ProtocolVersion::CURRENT)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Protocol version 2.3 not compatible with server version 1.0"
        );
        assert!(ProtocolVersion::new(1, 7)
            .check_against(&ProtocolVersion::CURRENT)
            .is_ok());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(format!("{}", ProtocolVersion::new(1, 2)), "1.2");
    }
}
