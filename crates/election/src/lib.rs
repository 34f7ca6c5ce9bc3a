//! Leader election over a lease-based coordination service.
//!
//! Pure Rust implementation of the etcd session/election recipe used to
//! decide which node of a fleet holds a shared virtual IP.
//!
//! # Features
//!
//! - Lease-backed [`Session`] with a cancellable keep-alive task
//! - Revision-ordered [`Election`] (first writer wins, losers queue)
//! - Watch-based waiting, no polling
//! - etcd v3 backend and an in-process backend for tests
//!
//! # Example
//!
//! ```no_run
//! use election::{Election, MemoryCoordinator, Session, DEFAULT_ELECTION_KEY, DEFAULT_LEASE_TTL};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> common::Result<()> {
//! let store = Arc::new(MemoryCoordinator::new());
//! let session = Arc::new(Session::open(store, DEFAULT_LEASE_TTL).await?);
//! let election = Election::new(session.clone(), DEFAULT_ELECTION_KEY);
//!
//! election.campaign(&CancellationToken::new(), "10.0.0.5").await?;
//! // ... leader work ...
//! election.resign().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod election;
mod etcd;
mod memory;
mod session;
mod types;

pub use coordinator::Coordinator;
pub use election::Election;
pub use etcd::EtcdCoordinator;
pub use memory::MemoryCoordinator;
pub use session::Session;
pub use types::{
    DEFAULT_ELECTION_KEY, DEFAULT_LEASE_TTL, ElectionState, KeyValue, LeaderKey, LeaseId,
    Revision,
};

/// Re-exported so callers can build connection options without a direct dependency.
pub use etcd_client::{Certificate, ConnectOptions, Identity, TlsOptions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_ELECTION_KEY, "/advertise-ip");
        assert_eq!(DEFAULT_LEASE_TTL.as_secs(), 60);
        assert_eq!(ElectionState::Campaigning.to_string(), "CAMPAIGNING");
    }
}
