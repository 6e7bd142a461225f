//! Keeps the console connection alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, instrument};

use crate::rcon::Console;

/// Periodically reconnects the console when it's down.
pub struct Supervisor {
    console: Arc<dyn Console>,
    interval: Duration,
}

impl Supervisor {
    /// Creates a supervisor that checks `console` every `interval`.
    #[must_use]
    pub fn new(console: Arc<dyn Console>, interval: Duration) -> Self {
        Self { console, interval }
    }

    /// Runs a single check, reconnecting if the console is down.
    ///
    /// Returns whether a connection attempt was made. A failed attempt is logged and otherwise
    /// ignored; the connection state only changes through the console itself.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> bool {
        if self.console.is_connected() {
            return false;
        }

        debug!("console is disconnected, reconnecting");

        if let Err(err) = self.console.connect().await {
            error!(?err, "could not connect to console");
        }

        true
    }

    /// Checks the console on every interval, forever.
    ///
    /// The first check happens immediately.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::rcon::Error;

    /// Console whose connection attempts succeed only when `reachable` is set.
    #[derive(Default)]
    struct FakeConsole {
        connected: AtomicBool,
        reachable: AtomicBool,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Console for FakeConsole {
        async fn connect(&self) -> Result<(), Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            if self.reachable.load(Ordering::SeqCst) {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(Error::Timeout)
            }
        }

        async fn send(&self, _command: &str) -> Result<String, Error> {
            Ok(String::new())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn supervisor(console: &Arc<FakeConsole>) -> Supervisor {
        Supervisor::new(console.clone(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn reconnects_when_disconnected() {
        let console = Arc::new(FakeConsole::default());
        console.reachable.store(true, Ordering::SeqCst);

        assert!(supervisor(&console).tick().await);
        assert_eq!(console.attempts.load(Ordering::SeqCst), 1);
        assert!(console.is_connected());
    }

    #[tokio::test]
    async fn leaves_connected_console_alone() {
        let console = Arc::new(FakeConsole::default());
        console.connected.store(true, Ordering::SeqCst);

        assert!(!supervisor(&console).tick().await);
        assert_eq!(console.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retries_after_failed_attempt() {
        let console = Arc::new(FakeConsole::default());
        let supervisor = supervisor(&console);

        assert!(supervisor.tick().await);
        assert!(!console.is_connected());

        console.reachable.store(true, Ordering::SeqCst);

        assert!(supervisor.tick().await);
        assert!(console.is_connected());
        assert_eq!(console.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_ticking_after_failures() {
        let console = Arc::new(FakeConsole::default());
        let handle = tokio::spawn(supervisor(&console).run());

        tokio::time::sleep(Duration::from_millis(35)).await;

        assert!(console.attempts.load(Ordering::SeqCst) >= 3);
        assert!(!handle.is_finished());

        handle.abort();
    }
}
