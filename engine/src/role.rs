//! Node role detection.
//!
//! The role is derived once from the runtime identity of the process (the
//! host it answers to) and is never persisted.

use serde::{Deserialize, Serialize};

/// Whether this node may originate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Write-capable node
    Primary,
    /// Read-only mirror of the remote store
    Replica,
}

impl NodeRole {
    /// Detect the role from a runtime identity.
    ///
    /// The identity is compared case-insensitively with any `:port` suffix
    /// removed. A match against `primary_identities` yields `Primary`.
    pub fn detect<I, S>(identity: &str, primary_identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let host = normalize_identity(identity);
        let is_primary = primary_identities
            .into_iter()
            .any(|candidate| normalize_identity(candidate.as_ref()) == host);

        if is_primary {
            NodeRole::Primary
        } else {
            NodeRole::Replica
        }
    }

    pub fn can_write(self) -> bool {
        self == NodeRole::Primary
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Replica => "replica",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_identity(identity: &str) -> String {
    let trimmed = identity.trim();
    // Bracketed IPv6 literal, with or without a port.
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_ascii_lowercase();
        }
    }
    let host = match trimmed.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => trimmed,
    };
    host.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARIES: [&str; 2] = ["localhost", "127.0.0.1"];

    #[test]
    fn localhost_is_primary() {
        assert_eq!(NodeRole::detect("localhost", PRIMARIES), NodeRole::Primary);
        assert_eq!(
            NodeRole::detect("LOCALHOST:5173", PRIMARIES),
            NodeRole::Primary
        );
        assert_eq!(
            NodeRole::detect("127.0.0.1:3000", PRIMARIES),
            NodeRole::Primary
        );
    }

    #[test]
    fn deployed_host_is_replica() {
        assert_eq!(
            NodeRole::detect("listings.example.com", PRIMARIES),
            NodeRole::Replica
        );
        assert_eq!(NodeRole::detect("", PRIMARIES), NodeRole::Replica);
    }

    #[test]
    fn ipv6_identities() {
        assert_eq!(NodeRole::detect("[::1]:8080", ["::1"]), NodeRole::Primary);
        assert_eq!(NodeRole::detect("::1", ["::1"]), NodeRole::Primary);
    }

    #[test]
    fn only_primary_writes() {
        assert!(NodeRole::Primary.can_write());
        assert!(!NodeRole::Replica.can_write());
        assert_eq!(NodeRole::Replica.to_string(), "replica");
    }
}
