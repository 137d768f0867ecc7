//! Client version handling for the compatibility gate.

use crate::{ProtocolError, ProtocolResult};
use std::str::FromStr;

/// A `major.minor.patch` client version.
///
/// The central server advertises the version range it accepts; the
/// comparison against that range decides whether a rejected client is
/// too old (upgrade) or too new (server upgrade required).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
    /// Patch version.
    pub patch: u16,
}

impl ClientVersion {
    /// Creates a version.
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ClientVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        let malformed = || ProtocolError::MalformedVersion(s.to_string());
        let mut parts = s.trim().splitn(3, '.');
        let mut next = || -> ProtocolResult<u16> {
            parts
                .next()
                .ok_or_else(malformed)?
                .parse()
                .map_err(|_| malformed())
        };
        Ok(Self {
            major: next()?,
            minor: next()?,
            patch: next()?,
        })
    }
}

impl std::fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
