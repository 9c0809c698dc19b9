//! # Connectivity Monitor
//!
//! Tracks the online/offline state of the device and fans it out to every
//! component that gates on it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitor                                │
//! │                                                                         │
//! │  Sources (host-supplied transitions):                                  │
//! │    • WebSocket transport state (connected ⇒ online)                    │
//! │    • OS network status events, when the shell forwards them            │
//! │    • Tests flip it manually                                            │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  watch::channel<bool> ───┬──► OutboxProcessor: gate before drains,     │
//! │                          │    offline→online edge triggers a drain     │
//! │                          └──► SyncEngine status / UI indicator         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::watch;
use tracing::info;

/// Shared online/offline state.
///
/// Cheap to clone; all clones observe the same state. Consumers either read
/// the current value (`is_online`) or subscribe for transitions.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        ConnectivityMonitor { tx }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records a transition. Idempotent - setting the current state again
    /// does not wake subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    /// Starts offline: the engine must observe a real online transition
    /// (or the transport connecting) before it attempts remote work.
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions_reach_subscribers() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        assert!(!monitor.is_online());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_redundant_set_does_not_wake() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.mark_unchanged();

        monitor.set_online(true); // no transition

        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::new(false);
        let clone = monitor.clone();

        clone.set_online(true);
        assert!(monitor.is_online());
    }
}
