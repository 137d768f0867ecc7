//! Sync channel paths.

use crate::{ProtocolError, ProtocolResult};

/// A named sync scope.
///
/// Either a whole table (`patient`) or a sub-resource scoped under a
/// parent id (`patient/{id}/encounter`). Channels appear verbatim in
/// sync URLs and as cursor keys, so segments must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(String);

impl Channel {
    /// Creates a root-level channel for a whole table.
    pub fn root(name: impl Into<String>) -> ProtocolResult<Self> {
        Self::parse(name.into())
    }

    /// Creates a channel scoped under a parent record.
    ///
    /// `Channel::scoped("patient", "p1", "encounter")` yields
    /// `patient/p1/encounter`.
    pub fn scoped(parent: &str, parent_id: &str, name: &str) -> ProtocolResult<Self> {
        Self::parse(format!("{parent}/{parent_id}/{name}"))
    }

    /// Parses a channel path, rejecting empty segments.
    pub fn parse(path: impl Into<String>) -> ProtocolResult<Self> {
        let path = path.into();
        if path.is_empty() || path.split('/').any(|seg| seg.is_empty()) {
            return Err(ProtocolError::MalformedChannel(path));
        }
        Ok(Self(path))
    }

    /// Returns the channel path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// For a scoped channel, returns `(parent_entity, parent_id,
    /// name)`; `None` for root channels.
    pub fn scope(&self) -> Option<(&str, &str, &str)> {
        let mut parts = self.0.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(parent), Some(id), Some(name)) => Some((parent, id, name)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
