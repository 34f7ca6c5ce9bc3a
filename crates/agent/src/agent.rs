//! VIP agent orchestration.
//!
//! Ties the election outcome to the local address binding:
//! - Starting → Campaigning: session opened, campaign started
//! - Campaigning → Advertising: campaign won, address attached
//! - Advertising → Releasing: termination signal (or lease loss)
//! - Releasing → Stopped: resigned, address detached, session closed
//!
//! The address is attached only after the campaign is won and is never
//! left attached once leadership is given up.

use common::{Error, Result};
use election::{Coordinator, DEFAULT_ELECTION_KEY, DEFAULT_LEASE_TTL, Election, Session};
use netif::{BindOutcome, InterfaceBinder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Bound on each shutdown-path cleanup step (resign, session close)
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle phase of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Opening the session
    Starting,
    /// Waiting to win the election
    Campaigning,
    /// Leader, address attached
    Advertising,
    /// Giving up leadership and the address
    Releasing,
    /// Done
    Stopped,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPhase::Starting => write!(f, "STARTING"),
            AgentPhase::Campaigning => write!(f, "CAMPAIGNING"),
            AgentPhase::Advertising => write!(f, "ADVERTISING"),
            AgentPhase::Releasing => write!(f, "RELEASING"),
            AgentPhase::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Agent settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Candidate identity and the address attached when leading
    pub advertise_ip: String,

    /// Interface the address is attached to
    pub interface: String,

    /// Election key shared by the fleet
    pub election_key: String,

    /// Session lease TTL
    pub lease_ttl: Duration,

    /// Bound on each cleanup step during shutdown
    pub cleanup_timeout: Duration,
}

impl AgentSettings {
    /// Settings with the default election key, lease TTL and cleanup timeout.
    pub fn new(advertise_ip: &str, interface: &str) -> Self {
        Self {
            advertise_ip: advertise_ip.to_string(),
            interface: interface.to_string(),
            election_key: DEFAULT_ELECTION_KEY.to_string(),
            lease_ttl: DEFAULT_LEASE_TTL,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }
}

/// Single leadership candidate for one virtual IP
pub struct Agent {
    settings: AgentSettings,
    coordinator: Arc<dyn Coordinator>,
    binder: InterfaceBinder,
    phase: watch::Sender<AgentPhase>,
}

impl Agent {
    /// Create an agent
    pub fn new(
        settings: AgentSettings,
        coordinator: Arc<dyn Coordinator>,
        binder: InterfaceBinder,
    ) -> Self {
        let (phase, _) = watch::channel(AgentPhase::Starting);
        Self {
            settings,
            coordinator,
            binder,
            phase,
        }
    }

    /// Follow the agent's lifecycle phase
    pub fn subscribe(&self) -> watch::Receiver<AgentPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: AgentPhase) {
        self.phase.send_replace(phase);
    }

    /// Run the full lifecycle until `shutdown` resolves.
    ///
    /// Returns `Ok(())` only for a shutdown-triggered exit. Session,
    /// campaign and attach failures, and lease loss while advertising, are
    /// returned as errors after best-effort cleanup.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(
            ip = %self.settings.advertise_ip,
            iface = %self.settings.interface,
            "Starting VIP agent"
        );

        let session = match Session::open(self.coordinator.clone(), self.settings.lease_ttl).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.set_phase(AgentPhase::Stopped);
                return Err(e);
            }
        };

        let result = self.lead(&session, shutdown).await;

        match timeout(self.settings.cleanup_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close session"),
            Err(_) => warn!("Timed out closing session"),
        }

        self.set_phase(AgentPhase::Stopped);
        result
    }

    async fn lead<F>(&self, session: &Arc<Session>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let ip = self.settings.advertise_ip.as_str();
        let election = Election::new(session.clone(), &self.settings.election_key);
        let cancel = CancellationToken::new();

        self.set_phase(AgentPhase::Campaigning);
        info!(key = %self.settings.election_key, "attempting to acquire leader lease");

        let campaign = election.campaign(&cancel, ip);
        tokio::pin!(campaign);

        let outcome = tokio::select! {
            result = &mut campaign => Some(result),
            _ = &mut shutdown => None,
        };

        match outcome {
            Some(result) => result?,
            None => {
                info!("Termination signal received while campaigning");
                cancel.cancel();
                return match campaign.await {
                    Err(Error::Canceled) => Ok(()),
                    // Won in the same instant; never attached, so just resign
                    Ok(()) => {
                        self.set_phase(AgentPhase::Releasing);
                        self.resign(&election).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
            }
        }

        info!(key = %self.settings.election_key, "campaign won");
        info!(ip = %ip, iface = %self.settings.interface, "advertising ip");

        match self.binder.attach(&self.settings.interface, ip) {
            Ok(BindOutcome::InterfaceAbsent) => {
                warn!(iface = %self.settings.interface, "Leading without a local binding");
            }
            Ok(_) => {}
            Err(e) => {
                error!(ip = %ip, error = %e, "Failed to attach ip, giving up leadership");
                self.set_phase(AgentPhase::Releasing);
                self.resign(&election).await;
                return Err(e);
            }
        }
        self.set_phase(AgentPhase::Advertising);

        let lease_lost = tokio::select! {
            _ = &mut shutdown => false,
            _ = session.expired() => true,
        };

        self.set_phase(AgentPhase::Releasing);

        if lease_lost {
            error!(ip = %ip, "Lease lost while advertising, releasing ip");
            self.detach();
            return Err(Error::SessionExpired {
                lease: session.lease_id(),
            });
        }

        info!(ip = %ip, "releasing ip");
        self.resign(&election).await;
        self.detach();
        Ok(())
    }

    /// Resign under the cleanup timeout; failures are logged only.
    async fn resign(&self, election: &Election) {
        match timeout(self.settings.cleanup_timeout, election.resign()).await {
            Ok(Ok(())) => info!(key = %self.settings.election_key, "resigned"),
            Ok(Err(e)) => warn!(error = %e, "Failed to resign"),
            Err(_) => warn!("Timed out resigning"),
        }
    }

    /// Detach the address; failures are logged only.
    fn detach(&self) {
        let ip = &self.settings.advertise_ip;
        match self.binder.detach(&self.settings.interface, ip) {
            Ok(_) => info!(ip = %ip, iface = %self.settings.interface, "ip detached"),
            Err(e) => error!(ip = %ip, error = %e, "Failed to release ip"),
        }
    }
}
