//! Coordination service primitives used by sessions and elections.

use crate::types::{KeyValue, LeaseId, Revision};
use async_trait::async_trait;
use common::Result;
use std::time::Duration;

/// Linearizable key-value store with lease-bound keys.
///
/// Every method maps onto a single round trip to the coordination service.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Grant a lease with the given TTL.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId>;

    /// Renew a lease once.
    ///
    /// Returns the remaining TTL, or `None` if the service no longer knows
    /// the lease (expired or revoked).
    async fn keep_alive(&self, lease: LeaseId) -> Result<Option<Duration>>;

    /// Revoke a lease, deleting every key bound to it. Unknown leases are ignored.
    async fn revoke_lease(&self, lease: LeaseId) -> Result<()>;

    /// Atomically create `key` bound to `lease` unless it already exists.
    ///
    /// Returns the stored entry and whether this call created it.
    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<(KeyValue, bool)>;

    /// Key under `prefix` with the greatest create revision not above
    /// `max_create_revision`, together with the store revision of the read.
    async fn latest_before(
        &self,
        prefix: &str,
        max_create_revision: Revision,
    ) -> Result<(Option<KeyValue>, Revision)>;

    /// Resolve once `key` has been deleted at or after `since_revision`.
    async fn wait_deleted(&self, key: &str, since_revision: Revision) -> Result<()>;

    /// Fetch a single key.
    async fn get(&self, key: &str) -> Result<Option<KeyValue>>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
