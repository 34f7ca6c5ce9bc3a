//! Election data types.

use std::time::Duration;

/// Lease identifier assigned by the coordination service.
pub type LeaseId = i64;

/// Store revision assigned by the coordination service to each write.
pub type Revision = i64;

/// Election key shared by every candidate in the fleet
pub const DEFAULT_ELECTION_KEY: &str = "/advertise-ip";

/// Default session lease TTL (matches the etcd client library default)
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(60);

/// A key stored at the coordination service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    /// Revision at which the key was created
    pub create_revision: Revision,
    /// Lease the key is bound to (0 = none)
    pub lease: LeaseId,
}

/// The key this process holds under the election prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderKey {
    pub key: String,
    pub revision: Revision,
}

/// Election state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    /// Not campaigning
    Idle,
    /// Candidate key written, waiting for earlier candidates to go away
    Campaigning,
    /// Candidate key is the lowest revision under the prefix
    Leading,
    /// Deleting the candidate key
    Resigning,
    /// Candidate key deleted
    Resigned,
}

impl std::fmt::Display for ElectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectionState::Idle => write!(f, "IDLE"),
            ElectionState::Campaigning => write!(f, "CAMPAIGNING"),
            ElectionState::Leading => write!(f, "LEADING"),
            ElectionState::Resigning => write!(f, "RESIGNING"),
            ElectionState::Resigned => write!(f, "RESIGNED"),
        }
    }
}
