//! Process-wide shutdown signal
//!
//! One `Shutdown` trigger, any number of `ShutdownSignal` listeners. Firing
//! consumes the trigger, so the signal can only be closed once.

use tokio::sync::watch;

/// Owning side of the shutdown channel
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Listening side handed to every adapter task
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    /// Extra listener, e.g. for a task spawned after startup
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(self) {
        // Listeners that already exited are fine.
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered, or the trigger was dropped
    pub async fn recv(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_listeners_observe_trigger() {
        let (shutdown, signal) = Shutdown::new();
        let mut a = signal.clone();
        let mut b = shutdown.subscribe();
        assert!(!a.is_triggered());

        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), a.recv())
            .await
            .expect("listener a should wake");
        tokio::time::timeout(Duration::from_secs(1), b.recv())
            .await
            .expect("listener b should wake");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_listeners() {
        let (shutdown, mut signal) = Shutdown::new();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("listener should wake when trigger is dropped");
    }
}
