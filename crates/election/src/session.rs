//! Lease-backed liveness session.
//!
//! A session grants one lease and keeps it alive from a background task
//! until [`Session::close`] is called. Keys written with the session's lease
//! disappear when the process stops renewing it.

use crate::coordinator::Coordinator;
use crate::types::LeaseId;
use common::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lower bound on the renewal period
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Session holding one lease at the coordination service
pub struct Session {
    coordinator: Arc<dyn Coordinator>,
    lease: LeaseId,
    ttl: Duration,
    /// Stops the keep-alive task
    shutdown: CancellationToken,
    /// Cancelled once the lease is known to be lost
    expired: CancellationToken,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Grant a lease and start renewing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the lease cannot be granted.
    pub async fn open(coordinator: Arc<dyn Coordinator>, ttl: Duration) -> Result<Self> {
        let lease = coordinator
            .grant_lease(ttl)
            .await
            .map_err(|e| Error::connection(format!("failed to open session: {}", e)))?;

        let shutdown = CancellationToken::new();
        let expired = CancellationToken::new();

        let handle = tokio::spawn(keep_alive_loop(
            coordinator.clone(),
            lease,
            ttl,
            shutdown.clone(),
            expired.clone(),
        ));

        info!(lease = format_args!("{:x}", lease), ttl_secs = ttl.as_secs(), "Session opened");

        Ok(Self {
            coordinator,
            lease,
            ttl,
            shutdown,
            expired,
            keepalive: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// Lease backing this session
    pub fn lease_id(&self) -> LeaseId {
        self.lease
    }

    /// Lease TTL requested at open
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Coordination service this session lives on
    pub fn coordinator(&self) -> &Arc<dyn Coordinator> {
        &self.coordinator
    }

    /// Whether the lease has been lost.
    pub fn is_expired(&self) -> bool {
        self.expired.is_cancelled()
    }

    /// Resolves once the lease has been lost.
    pub async fn expired(&self) {
        self.expired.cancelled().await
    }

    /// Whether the keep-alive task is still renewing the lease.
    pub async fn is_keepalive_running(&self) -> bool {
        self.keepalive
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop renewing and revoke the lease. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.cancel();
        if let Some(handle) = self.keepalive.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Keep-alive task ended abnormally");
            }
        }

        self.coordinator.revoke_lease(self.lease).await?;
        info!(lease = format_args!("{:x}", self.lease), "Session closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Without close() the lease is left to expire at the service
        self.shutdown.cancel();
    }
}

async fn keep_alive_loop(
    coordinator: Arc<dyn Coordinator>,
    lease: LeaseId,
    ttl: Duration,
    shutdown: CancellationToken,
    expired: CancellationToken,
) {
    let mut ticker = interval((ttl / 3).max(MIN_RENEW_INTERVAL));
    ticker.tick().await; // Lease was just granted

    let mut last_renewal = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A renewal that never answers must not outlive the lease
        let deadline = last_renewal + ttl;
        let renewed = tokio::select! {
            _ = shutdown.cancelled() => break,
            renewed = timeout_at(deadline, coordinator.keep_alive(lease)) => renewed,
        };

        match renewed {
            Ok(Ok(Some(remaining))) => {
                trace!(lease = format_args!("{:x}", lease), remaining_ms = remaining.as_millis(), "Lease renewed");
                last_renewal = Instant::now();
                continue;
            }
            Ok(Ok(None)) => {
                error!(lease = format_args!("{:x}", lease), "Lease no longer exists at coordination service");
                expired.cancel();
                return;
            }
            Ok(Err(e)) => {
                warn!(lease = format_args!("{:x}", lease), error = %e, "Lease renewal failed");
            }
            Err(_) => {
                warn!(lease = format_args!("{:x}", lease), "Lease renewal timed out");
            }
        }

        if Instant::now() >= deadline {
            error!(lease = format_args!("{:x}", lease), "No renewal within lease TTL, session lost");
            expired.cancel();
            return;
        }
    }

    debug!(lease = format_args!("{:x}", lease), "Keep-alive stopped");
}
