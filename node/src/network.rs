//! Network connectivity monitor.
//!
//! Holds the current online flag and publishes `online`/`offline`
//! transitions to subscribers. The flag is driven either externally
//! ([`NetworkMonitor::set_online`]) or by a periodic reachability probe
//! ([`NetworkMonitor::spawn_probe`]).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

/// Shared connectivity state. Cloning yields another handle to the same
/// state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Publish the current connectivity. Returns `true` if this was a
    /// transition; repeated values are not re-announced.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(status = ?NetworkStatus::from(online), "Network status changed");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn status(&self) -> NetworkStatus {
        self.is_online().into()
    }

    /// A receiver that observes every future transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Run `check` every `interval` and publish its result.
    pub fn spawn_probe<F, Fut>(&self, interval: Duration, check: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.set_online(check().await);
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
