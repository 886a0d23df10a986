use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ConfigInner;
use crate::metrics::WATCH_EVENTS_APPLIED;
use crate::metrics::WATCH_EVENTS_SKIPPED;
use crate::ConfigRecord;
use crate::EventKind;
use crate::WatchEvent;
use crate::WatchStream;

/// What the watcher did with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventOutcome {
    Applied,
    /// Key under the prefix that the schema does not know
    Unknown,
    /// Payload did not decode or coerce
    Rejected,
    /// Slot already holds this or a newer revision
    Stale,
    /// Deletes leave the field untouched
    Deleted,
}

impl EventOutcome {
    fn label(self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Unknown => "unknown",
            EventOutcome::Rejected => "rejected",
            EventOutcome::Stale => "stale",
            EventOutcome::Deleted => "delete",
        }
    }
}

/// Consume `stream` until it closes or `cancel` fires
pub(crate) async fn run_watcher<R: ConfigRecord>(
    inner: Arc<ConfigInner<R>>,
    mut stream: WatchStream,
    cancel: CancellationToken,
) {
    debug!(prefix = %inner.prefix, "watcher started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(prefix = %inner.prefix, "watcher cancelled");
                break;
            }
            event = stream.next() => match event {
                Some(event) => {
                    let outcome = handle_event(&inner, &event);
                    trace!(key = %event.kv.key, revision = event.kv.mod_revision, ?outcome, "watch event handled");
                }
                None => {
                    info!(prefix = %inner.prefix, "watch stream closed");
                    break;
                }
            }
        }
    }
}

/// Apply one event to the record. Failures are logged and skipped.
pub(crate) fn handle_event<R: ConfigRecord>(
    inner: &ConfigInner<R>,
    event: &WatchEvent,
) -> EventOutcome {
    let outcome = apply_event(inner, event);

    match outcome {
        EventOutcome::Applied => WATCH_EVENTS_APPLIED.with_label_values(&["put"]).inc(),
        skipped => WATCH_EVENTS_SKIPPED.with_label_values(&[skipped.label()]).inc(),
    }
    outcome
}

fn apply_event<R: ConfigRecord>(
    inner: &ConfigInner<R>,
    event: &WatchEvent,
) -> EventOutcome {
    let key = &event.kv.key;

    let Some(entry) = inner.entry_for_key(key) else {
        trace!(key = %key, "ignoring key outside the schema");
        return EventOutcome::Unknown;
    };

    if event.kind == EventKind::Delete {
        debug!(name = %entry.name, revision = event.kv.mod_revision, "key deleted, field keeps its value");
        return EventOutcome::Deleted;
    }

    let typed = match inner.decode_for(entry, key, &event.kv.value) {
        Ok(typed) => typed,
        Err(e) => {
            warn!(key = %key, revision = event.kv.mod_revision, "skipping watch event: {}", e);
            return EventOutcome::Rejected;
        }
    };

    match inner.state.write().apply(entry.slot, typed, event.kv.mod_revision) {
        Ok(true) => EventOutcome::Applied,
        Ok(false) => EventOutcome::Stale,
        Err(e) => {
            warn!(key = %key, "skipping watch event: {}", e);
            EventOutcome::Rejected
        }
    }
}
