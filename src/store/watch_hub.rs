//! Prefix watcher registry shared by the store backends
//!
//! Backends call [`WatchHub::notify`] while still holding their commit lock,
//! so every watcher sees events in commit order. Per-watcher channels are
//! unbounded: a slow consumer delays nothing on the write path and never
//! misses an event.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use super::WatchEvent;
use super::WatchStream;

#[derive(Debug)]
struct Watcher {
    id: u64,
    sender: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Debug, Default)]
struct WatchHubInner {
    /// Watchers grouped by watched prefix
    watchers: DashMap<String, Vec<Watcher>>,
    next_id: AtomicU64,
}

/// Unregisters its watcher when dropped
#[derive(Debug)]
pub struct WatcherGuard {
    id: u64,
    prefix: String,
    hub: Arc<WatchHubInner>,
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.hub.watchers.remove_if_mut(&self.prefix, |_prefix, watchers| {
            watchers.retain(|w| w.id != self.id);
            watchers.is_empty()
        });
        trace!(watcher_id = self.id, prefix = %self.prefix, "Watcher unregistered");
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchHub {
    inner: Arc<WatchHubInner>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher for `prefix`.
    ///
    /// `backlog` is delivered ahead of any live event. The caller must hold
    /// its commit lock so no write lands between the backlog snapshot and
    /// registration.
    pub fn register(
        &self,
        prefix: &str,
        backlog: Vec<WatchEvent>,
    ) -> WatchStream {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let replayed = backlog.len();
        for event in backlog {
            // Receiver is alive in this scope
            let _ = sender.send(event);
        }

        self.inner
            .watchers
            .entry(prefix.to_string())
            .or_default()
            .push(Watcher { id, sender });

        trace!(watcher_id = id, prefix = %prefix, replayed, "Watcher registered");

        WatchStream::new(
            receiver,
            Some(WatcherGuard {
                id,
                prefix: prefix.to_string(),
                hub: self.inner.clone(),
            }),
        )
    }

    /// Deliver committed events to every watcher whose prefix matches
    pub fn notify(
        &self,
        events: &[WatchEvent],
    ) {
        if events.is_empty() {
            return;
        }

        for entry in self.inner.watchers.iter() {
            let prefix = entry.key();
            for event in events.iter().filter(|e| e.kv.key.starts_with(prefix.as_str())) {
                for watcher in entry.value() {
                    // A closed receiver is cleaned up by its guard
                    let _ = watcher.sender.send(event.clone());
                }
            }
        }

        trace!(events = events.len(), "Events dispatched");
    }

    /// Drop every sender so all open streams end
    pub fn close_all(&self) {
        self.inner.watchers.clear();
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.iter().map(|e| e.value().len()).sum()
    }

    pub fn watched_prefix_count(&self) -> usize {
        self.inner.watchers.len()
    }
}
