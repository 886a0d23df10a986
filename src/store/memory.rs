use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use super::check_revision;
use super::plan_txn;
use super::put_record;
use super::tombstone;
use super::visible_at;
use super::KeyRecord;
use super::KeyValue;
use super::KvStore;
use super::RangeResponse;
use super::Txn;
use super::TxnPlan;
use super::TxnResponse;
use super::WatchHub;
use super::WatchStream;
use crate::Result;
use crate::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    revision: i64,
    /// Full history per key, ascending by modification revision
    keys: BTreeMap<String, Vec<KeyRecord>>,
    closed: bool,
}

impl MemoryState {
    fn latest(
        &self,
        key: &str,
    ) -> Option<&KeyValue> {
        self.keys.get(key).and_then(|h| h.last()).and_then(KeyRecord::live)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed.into());
        }
        Ok(())
    }

    fn commit(
        &mut self,
        records: Vec<KeyRecord>,
        hub: &WatchHub,
    ) -> i64 {
        if records.is_empty() {
            return self.revision;
        }

        self.revision += 1;
        let events: Vec<_> = records.iter().map(KeyRecord::to_event).collect();
        for record in records {
            self.keys.entry(record.kv.key.clone()).or_default().push(record);
        }
        hub.notify(&events);

        trace!(revision = self.revision, ops = events.len(), "memory store commit");
        self.revision
    }
}

/// In-process MVCC store retaining the full history of every key
///
/// All writes are serialized by one mutex, which is also held while events
/// are handed to watchers.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    state: Mutex<MemoryState>,
    hub: WatchHub,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// End every open watch stream and reject further calls
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.hub.close_all();
        debug!("memory store closed");
    }

    pub fn watcher_count(&self) -> usize {
        self.hub.watcher_count()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.latest(key).cloned())
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<RangeResponse> {
        let state = self.state.lock();
        state.ensure_open()?;

        let kvs = state
            .keys
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter_map(|(_, history)| history.last().and_then(KeyRecord::live).cloned())
            .collect();

        Ok(RangeResponse {
            kvs,
            revision: state.revision,
        })
    }

    async fn get_at_revision(
        &self,
        key: &str,
        revision: i64,
    ) -> Result<Option<KeyValue>> {
        let state = self.state.lock();
        state.ensure_open()?;

        let at = check_revision(revision, state.revision)?;
        Ok(state
            .keys
            .get(key)
            .and_then(|history| visible_at(history, at))
            .cloned())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<i64> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let record = put_record(state.latest(key), key, value, state.revision + 1);
        Ok(state.commit(vec![record], &self.hub))
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<usize> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        if state.latest(key).is_none() {
            return Ok(0);
        }
        let record = tombstone(key, state.revision + 1);
        state.commit(vec![record], &self.hub);
        Ok(1)
    }

    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<usize> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let next = state.revision + 1;
        let records: Vec<_> = state
            .keys
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, history)| history.last().and_then(KeyRecord::live).is_some())
            .map(|(k, _)| tombstone(k, next))
            .collect();

        let deleted = records.len();
        state.commit(records, &self.hub);
        Ok(deleted)
    }

    async fn txn(
        &self,
        txn: Txn,
    ) -> Result<TxnResponse> {
        let mut state = self.state.lock();
        state.ensure_open()?;

        let plan = plan_txn(&txn, state.revision + 1, |key| Ok(state.latest(key).cloned()))?;
        match plan {
            TxnPlan::Rejected => Ok(TxnResponse {
                succeeded: false,
                revision: state.revision,
            }),
            TxnPlan::Accepted { records } => Ok(TxnResponse {
                succeeded: true,
                revision: state.commit(records, &self.hub),
            }),
        }
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<WatchStream> {
        let state = self.state.lock();
        state.ensure_open()?;

        let mut backlog: Vec<_> = if start_revision > 0 {
            state
                .keys
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .flat_map(|(_, history)| history.iter())
                .filter(|r| r.kv.mod_revision >= start_revision)
                .map(KeyRecord::to_event)
                .collect()
        } else {
            Vec::new()
        };
        backlog.sort_by_key(|e| e.kv.mod_revision);

        Ok(self.hub.register(prefix, backlog))
    }

    async fn current_revision(&self) -> Result<i64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.revision)
    }
}
