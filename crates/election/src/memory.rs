//! In-process coordination service.
//!
//! Linearizable by construction (a single lock guards all state) and
//! faithful to the parts of etcd's data model elections depend on: a global
//! revision counter, lease-bound keys, and change notification. Used to run
//! several sessions and elections inside one test process.

use crate::coordinator::Coordinator;
use crate::types::{KeyValue, LeaseId, Revision};
use async_trait::async_trait;
use common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::debug;

/// First lease ID handed out, so keys read like real etcd lease IDs.
const FIRST_LEASE_ID: LeaseId = 0x694d_0000_0000_0001;

#[derive(Debug)]
struct Inner {
    revision: Revision,
    next_lease: LeaseId,
    leases: HashMap<LeaseId, Duration>,
    keys: BTreeMap<String, KeyValue>,
}

impl Inner {
    /// Remove every key bound to `lease`. Returns true if anything changed.
    fn drop_lease(&mut self, lease: LeaseId) -> bool {
        let existed = self.leases.remove(&lease).is_some();
        let before = self.keys.len();
        self.keys.retain(|_, kv| kv.lease != lease);
        if self.keys.len() != before {
            self.revision += 1;
        }
        existed
    }
}

/// In-memory [`Coordinator`].
pub struct MemoryCoordinator {
    inner: Mutex<Inner>,
    changes: watch::Sender<Revision>,
}

impl MemoryCoordinator {
    /// Create an empty store at revision 1.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(1);
        Self {
            inner: Mutex::new(Inner {
                revision: 1,
                next_lease: FIRST_LEASE_ID,
                leases: HashMap::new(),
                keys: BTreeMap::new(),
            }),
            changes,
        }
    }

    /// Simulate the service expiring a lease whose holder stopped renewing it.
    ///
    /// Bound keys are removed and later keep-alives report the lease as gone.
    pub async fn expire_lease(&self, lease: LeaseId) {
        let mut inner = self.inner.lock().await;
        if inner.drop_lease(lease) {
            debug!(lease = format_args!("{:x}", lease), "Lease expired");
        }
        self.changes.send_replace(inner.revision);
    }

    /// All keys under `prefix`, ordered by create revision.
    pub async fn keys(&self, prefix: &str) -> Vec<KeyValue> {
        let inner = self.inner.lock().await;
        let mut kvs: Vec<KeyValue> = inner
            .keys
            .values()
            .filter(|kv| kv.key.starts_with(prefix))
            .cloned()
            .collect();
        kvs.sort_by_key(|kv| kv.create_revision);
        kvs
    }

    /// Whether the store still knows `lease`.
    pub async fn has_lease(&self, lease: LeaseId) -> bool {
        self.inner.lock().await.leases.contains_key(&lease)
    }

    /// Current store revision.
    pub async fn revision(&self) -> Revision {
        self.inner.lock().await.revision
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId> {
        let mut inner = self.inner.lock().await;
        let lease = inner.next_lease;
        inner.next_lease += 1;
        inner.leases.insert(lease, ttl);
        Ok(lease)
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<Option<Duration>> {
        Ok(self.inner.lock().await.leases.get(&lease).copied())
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.drop_lease(lease);
        self.changes.send_replace(inner.revision);
        Ok(())
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<(KeyValue, bool)> {
        let mut inner = self.inner.lock().await;
        if !inner.leases.contains_key(&lease) {
            return Err(Error::coordination(format!(
                "requested lease not found: {:x}",
                lease
            )));
        }
        if let Some(existing) = inner.keys.get(key) {
            return Ok((existing.clone(), false));
        }

        inner.revision += 1;
        let kv = KeyValue {
            key: key.to_string(),
            value: value.to_string(),
            create_revision: inner.revision,
            lease,
        };
        inner.keys.insert(key.to_string(), kv.clone());
        self.changes.send_replace(inner.revision);
        Ok((kv, true))
    }

    async fn latest_before(
        &self,
        prefix: &str,
        max_create_revision: Revision,
    ) -> Result<(Option<KeyValue>, Revision)> {
        let inner = self.inner.lock().await;
        let latest = inner
            .keys
            .values()
            .filter(|kv| kv.key.starts_with(prefix) && kv.create_revision <= max_create_revision)
            .max_by_key(|kv| kv.create_revision)
            .cloned();
        Ok((latest, inner.revision))
    }

    async fn wait_deleted(&self, key: &str, _since_revision: Revision) -> Result<()> {
        // Subscribe before checking so a deletion between the two is not missed.
        let mut rx = self.changes.subscribe();
        loop {
            if !self.inner.lock().await.keys.contains_key(key) {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|_| Error::coordination("change feed closed"))?;
        }
    }

    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        Ok(self.inner.lock().await.keys.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.keys.remove(key).is_some() {
            inner.revision += 1;
            self.changes.send_replace(inner.revision);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_create_assigns_increasing_revisions() {
        let store = MemoryCoordinator::new();
        let lease = store.grant_lease(TTL).await.unwrap();

        let (a, created_a) = store.create_if_absent("/e/a", "A", lease).await.unwrap();
        let (b, created_b) = store.create_if_absent("/e/b", "B", lease).await.unwrap();

        assert!(created_a && created_b);
        assert!(a.create_revision < b.create_revision);
    }

    #[tokio::test]
    async fn test_create_existing_key_returns_original() {
        let store = MemoryCoordinator::new();
        let lease = store.grant_lease(TTL).await.unwrap();

        let (first, _) = store.create_if_absent("/e/a", "A", lease).await.unwrap();
        let (second, created) = store.create_if_absent("/e/a", "other", lease).await.unwrap();

        assert!(!created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_requires_live_lease() {
        let store = MemoryCoordinator::new();
        let result = store.create_if_absent("/e/a", "A", 42).await;
        assert!(matches!(result, Err(Error::Coordination(_))));
    }

    #[tokio::test]
    async fn test_latest_before_respects_max_revision() {
        let store = MemoryCoordinator::new();
        let lease = store.grant_lease(TTL).await.unwrap();
        let (a, _) = store.create_if_absent("/e/a", "A", lease).await.unwrap();
        let (b, _) = store.create_if_absent("/e/b", "B", lease).await.unwrap();
        store.create_if_absent("/other/c", "C", lease).await.unwrap();

        let (latest, _) = store.latest_before("/e/", b.create_revision - 1).await.unwrap();
        assert_eq!(latest, Some(a.clone()));

        let (latest, _) = store.latest_before("/e/", a.create_revision - 1).await.unwrap();
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn test_revoke_removes_bound_keys() {
        let store = MemoryCoordinator::new();
        let keep = store.grant_lease(TTL).await.unwrap();
        let gone = store.grant_lease(TTL).await.unwrap();
        store.create_if_absent("/e/a", "A", keep).await.unwrap();
        store.create_if_absent("/e/b", "B", gone).await.unwrap();

        store.revoke_lease(gone).await.unwrap();
        store.revoke_lease(gone).await.unwrap();

        let keys: Vec<String> = store.keys("/e/").await.into_iter().map(|kv| kv.key).collect();
        assert_eq!(keys, vec!["/e/a".to_string()]);
        assert_eq!(store.keep_alive(gone).await.unwrap(), None);
        assert_eq!(store.keep_alive(keep).await.unwrap(), Some(TTL));
    }

    #[tokio::test]
    async fn test_wait_deleted_wakes_on_delete() {
        let store = Arc::new(MemoryCoordinator::new());
        let lease = store.grant_lease(TTL).await.unwrap();
        store.create_if_absent("/e/a", "A", lease).await.unwrap();
        let rev = store.revision().await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_deleted("/e/a", rev).await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        store.delete("/e/a").await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after delete")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_noop() {
        let store = MemoryCoordinator::new();
        let before = store.revision().await;
        store.delete("/e/missing").await.unwrap();
        assert_eq!(store.revision().await, before);
    }
}
