//! # Connectivity Monitor
//!
//! Tracks whether the remote is believed reachable and announces
//! transitions. The signal source (OS network API, health probe, CLI flag)
//! calls [`ConnectivityMonitor::set_online`]; listeners only hear about
//! actual changes.
//!
//! ```text
//! set_online(true)  while offline ──► publish Online   (FlushWorker flushes)
//! set_online(true)  while online  ──► nothing
//! set_online(false) while online  ──► publish Offline
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::events::{EventBus, Subscription};

/// Connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Current connectivity plus change notifications. Clones share state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
    bus: EventBus<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        ConnectivityMonitor {
            online: Arc::new(AtomicBool::new(initially_online)),
            bus: EventBus::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Updates the state. Returns true (and publishes) only on a change.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }

        let event = if online {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        };
        info!(?event, "Connectivity changed");
        self.bus.publish(&event);
        true
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ConnectivityEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_publishes_only_on_change() {
        let monitor = ConnectivityMonitor::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let _sub = monitor.subscribe(move |e| s.lock().unwrap().push(*e));

        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));

        assert_eq!(
            *seen.lock().unwrap(),
            [ConnectivityEvent::Offline, ConnectivityEvent::Online]
        );
        assert!(monitor.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::new(false);
        let other = monitor.clone();
        other.set_online(true);
        assert!(monitor.is_online());
    }
}
