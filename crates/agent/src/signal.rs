//! Termination signal listener.

use std::io;
use tokio::signal::unix::{Signal, SignalKind, signal};

/// SIGINT and SIGTERM handlers, registered up front so a signal arriving
/// during the campaign is not lost.
pub struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

impl Signals {
    /// Register the handlers.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first termination signal and return its name.
    pub async fn wait(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{Signal as NixSignal, raise};
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_is_reported() {
        let signals = Signals::install().unwrap();
        raise(NixSignal::SIGTERM).unwrap();

        let name = tokio::time::timeout(Duration::from_secs(2), signals.wait())
            .await
            .expect("SIGTERM should be delivered");
        assert_eq!(name, "SIGTERM");
    }
}
