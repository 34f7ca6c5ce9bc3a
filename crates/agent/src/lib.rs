//! VIP agent
//!
//! Keeps a single virtual IP on exactly one node of a fleet. Every node
//! campaigns for leadership under a shared etcd key; the winner attaches
//! the address to its interface and holds it until it is told to stop.
//!
//! # Components
//!
//! - **Config**: environment loading and validation
//! - **Agent**: campaign → advertise → release lifecycle
//! - **Signals**: SIGINT/SIGTERM handling
//! - **TLS**: client certificate material for etcd

pub mod agent;
pub mod config;
pub mod signal;
pub mod tls;

pub use agent::{Agent, AgentPhase, AgentSettings, DEFAULT_CLEANUP_TIMEOUT};
pub use config::{Config, ConfigError, LogFormat};
pub use signal::Signals;
pub use tls::TlsFiles;
