//! Leader election on top of a [`Session`].
//!
//! Implements the etcd election recipe:
//! - Idle → Campaigning: write `<prefix>/<lease>` bound to the session lease
//! - Campaigning → Leading: every key with a lower create revision is gone
//! - Leading → Resigning → Resigned: delete our key
//!
//! Candidates are ordered purely by create revision, so the first writer
//! wins and the rest queue behind it.

use crate::session::Session;
use crate::types::{ElectionState, LeaderKey, Revision};
use common::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Election for a single named key
pub struct Election {
    session: Arc<Session>,
    prefix: String,
    state: RwLock<ElectionState>,
    leader: Mutex<Option<LeaderKey>>,
}

impl Election {
    /// Create an election named `name` on the given session.
    pub fn new(session: Arc<Session>, name: &str) -> Self {
        Self {
            session,
            prefix: format!("{}/", name.trim_end_matches('/')),
            state: RwLock::new(ElectionState::Idle),
            leader: Mutex::new(None),
        }
    }

    /// Prefix under which every candidate key lives
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key this process campaigns with
    pub fn candidate_key(&self) -> String {
        format!("{}{:x}", self.prefix, self.session.lease_id())
    }

    /// Get current election state
    pub async fn state(&self) -> ElectionState {
        *self.state.read().await
    }

    /// Key held while campaigning or leading
    pub async fn leader_key(&self) -> Option<LeaderKey> {
        self.leader.lock().await.clone()
    }

    async fn set_state(&self, state: ElectionState) {
        *self.state.write().await = state;
    }

    /// Campaign with `value` and wait until elected.
    ///
    /// # Errors
    ///
    /// - [`Error::Canceled`] if `cancel` fires before winning
    /// - [`Error::SessionExpired`] if the session lease is lost before winning
    /// - [`Error::Coordination`] on store failures
    ///
    /// On any error the candidate key has been removed again.
    pub async fn campaign(&self, cancel: &CancellationToken, value: &str) -> Result<()> {
        match self.state().await {
            ElectionState::Idle | ElectionState::Resigned => {}
            state => {
                return Err(Error::other(format!(
                    "cannot campaign while {}",
                    state
                )));
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }
        let lease = self.session.lease_id();
        if self.session.is_expired() {
            return Err(Error::SessionExpired { lease });
        }

        self.set_state(ElectionState::Campaigning).await;

        let key = self.candidate_key();
        let coordinator = self.session.coordinator();

        let (kv, created) = match coordinator.create_if_absent(&key, value, lease).await {
            Ok(entry) => entry,
            Err(e) => {
                self.set_state(ElectionState::Idle).await;
                return Err(e);
            }
        };
        if !created {
            debug!(key = %key, "Candidate key already present, reusing it");
        }

        let revision = kv.create_revision;
        *self.leader.lock().await = Some(LeaderKey {
            key: key.clone(),
            revision,
        });
        debug!(key = %key, revision, "Candidate key written");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Canceled),
            _ = self.session.expired() => Err(Error::SessionExpired { lease }),
            waited = self.wait_for_turn(revision) => waited,
        };

        if let Err(e) = outcome {
            self.abandon(&key).await;
            return Err(e);
        }

        // Lease loss deletes our key too, which would also end the wait
        match coordinator.get(&key).await {
            Ok(Some(current)) if current.create_revision == revision => {}
            Ok(_) => {
                self.abandon(&key).await;
                return Err(Error::SessionExpired { lease });
            }
            Err(e) => {
                self.abandon(&key).await;
                return Err(e);
            }
        }

        self.set_state(ElectionState::Leading).await;
        info!(key = %key, revision, "Elected leader");
        Ok(())
    }

    /// Block until no candidate with a lower create revision remains.
    async fn wait_for_turn(&self, revision: Revision) -> Result<()> {
        let coordinator = self.session.coordinator();
        loop {
            let (previous, read_revision) = coordinator
                .latest_before(&self.prefix, revision - 1)
                .await?;
            let Some(previous) = previous else {
                return Ok(());
            };
            debug!(waiting_on = %previous.key, "Waiting for earlier candidate");
            coordinator.wait_deleted(&previous.key, read_revision).await?;
        }
    }

    /// Remove our candidate key after a failed campaign.
    async fn abandon(&self, key: &str) {
        if let Err(e) = self.session.coordinator().delete(key).await {
            warn!(key = %key, error = %e, "Failed to remove candidate key");
        }
        *self.leader.lock().await = None;
        self.set_state(ElectionState::Idle).await;
    }

    /// Give up leadership (or candidacy) by deleting our key.
    ///
    /// Idempotent: resigning without a key, or after the key is already
    /// gone, succeeds.
    pub async fn resign(&self) -> Result<()> {
        let previous = self.state().await;
        self.set_state(ElectionState::Resigning).await;

        let mut leader = self.leader.lock().await;
        if let Some(held) = leader.clone() {
            if let Err(e) = self.session.coordinator().delete(&held.key).await {
                drop(leader);
                self.set_state(previous).await;
                return Err(e);
            }
            info!(key = %held.key, "Resigned");
        }
        *leader = None;
        drop(leader);

        self.set_state(ElectionState::Resigned).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCoordinator;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(10);

    async fn election(store: &Arc<MemoryCoordinator>) -> Election {
        let session = Session::open(store.clone(), TTL).await.unwrap();
        Election::new(Arc::new(session), "/advertise-ip")
    }

    #[tokio::test]
    async fn test_uncontested_campaign_wins() {
        let store = Arc::new(MemoryCoordinator::new());
        let e = election(&store).await;

        e.campaign(&CancellationToken::new(), "10.0.0.5").await.unwrap();

        assert_eq!(e.state().await, ElectionState::Leading);
        let keys = store.keys("/advertise-ip/").await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key, e.candidate_key());
        assert_eq!(keys[0].value, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_prefix_normalized() {
        let store = Arc::new(MemoryCoordinator::new());
        let session = Arc::new(Session::open(store.clone(), TTL).await.unwrap());
        let e = Election::new(session.clone(), "/advertise-ip/");
        assert_eq!(e.prefix(), "/advertise-ip/");
        assert_eq!(
            e.candidate_key(),
            format!("/advertise-ip/{:x}", session.lease_id())
        );
    }

    #[tokio::test]
    async fn test_precancelled_campaign_writes_nothing() {
        let store = Arc::new(MemoryCoordinator::new());
        let e = election(&store).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = e.campaign(&cancel, "10.0.0.5").await;

        assert!(matches!(result, Err(Error::Canceled)));
        assert!(store.keys("/advertise-ip/").await.is_empty());
        assert_eq!(e.state().await, ElectionState::Idle);
    }

    #[tokio::test]
    async fn test_campaign_twice_rejected() {
        let store = Arc::new(MemoryCoordinator::new());
        let e = election(&store).await;
        e.campaign(&CancellationToken::new(), "A").await.unwrap();

        let result = e.campaign(&CancellationToken::new(), "A").await;
        assert!(matches!(result, Err(Error::Other(_))));
        assert_eq!(e.state().await, ElectionState::Leading);
    }

    #[tokio::test]
    async fn test_resign_is_idempotent() {
        let store = Arc::new(MemoryCoordinator::new());
        let e = election(&store).await;

        // Resign before campaigning
        e.resign().await.unwrap();
        assert_eq!(e.state().await, ElectionState::Resigned);

        e.campaign(&CancellationToken::new(), "A").await.unwrap();
        e.resign().await.unwrap();
        e.resign().await.unwrap();

        assert_eq!(e.state().await, ElectionState::Resigned);
        assert!(e.leader_key().await.is_none());
        assert!(store.keys("/advertise-ip/").await.is_empty());
    }

    #[tokio::test]
    async fn test_campaign_on_expired_session_fails() {
        let store = Arc::new(MemoryCoordinator::new());
        let session = Arc::new(Session::open(store.clone(), Duration::from_millis(60)).await.unwrap());
        store.expire_lease(session.lease_id()).await;
        tokio::time::timeout(Duration::from_secs(2), session.expired())
            .await
            .unwrap();

        let e = Election::new(session, "/advertise-ip");
        let result = e.campaign(&CancellationToken::new(), "A").await;

        assert!(matches!(result, Err(Error::SessionExpired { .. })));
        assert!(store.keys("/advertise-ip/").await.is_empty());
    }
}
