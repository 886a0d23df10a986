//! MVCC store persisted in sled
//!
//! Layout:
//! - `latest` tree: key -> bincode [`KeyValue`] for live keys
//! - `history` tree: key ++ `0x00` ++ big-endian revision -> bincode record
//! - `meta` tree: store revision
//!
//! Every commit writes all three trees in one sled transaction.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use sled::transaction::ConflictableTransactionResult;
use sled::transaction::TransactionError;
use sled::Transactional;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::check_revision;
use super::plan_txn;
use super::put_record;
use super::tombstone;
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
use crate::StorageSettings;
use crate::StoreError;

const LATEST_TREE: &str = "d_config_latest";
const HISTORY_TREE: &str = "d_config_history";
const META_TREE: &str = "d_config_meta";
const REVISION_KEY: &[u8] = b"revision";

/// Separates the user key from the revision suffix in history keys
const HISTORY_SEPARATOR: u8 = 0x00;

pub struct SledKvStore {
    db: sled::Db,
    latest: sled::Tree,
    history: sled::Tree,
    meta: sled::Tree,
    /// Serializes commits and watch registration
    write_lock: Mutex<()>,
    hub: WatchHub,
}

impl std::fmt::Debug for SledKvStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledKvStore")
            .field("keys", &self.latest.len())
            .field("watchers", &self.hub.watcher_count())
            .finish()
    }
}

impl Drop for SledKvStore {
    fn drop(&mut self) {
        match self.db.flush() {
            Ok(_) => info!("Successfully flushed sled store"),
            Err(e) => error!(?e, "Failed to flush sled store"),
        }
    }
}

impl SledKvStore {
    /// Open (or create) a store under `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(&StorageSettings {
            db_path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    pub fn open_with(settings: &StorageSettings) -> Result<Self> {
        debug!(path = ?settings.db_path, "opening sled store");

        let db = sled::Config::default()
            .path(&settings.db_path)
            .flush_every_ms(Some(settings.flush_every_ms))
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!(
                    "Try to open DB at this location: {:?} and failed: {:?}",
                    settings.db_path, e
                );
                StoreError::Sled(e)
            })?;

        Self::from_db(db)
    }

    /// Store backed by a temporary database removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(StoreError::Sled)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let latest = db.open_tree(LATEST_TREE).map_err(StoreError::Sled)?;
        let history = db.open_tree(HISTORY_TREE).map_err(StoreError::Sled)?;
        let meta = db.open_tree(META_TREE).map_err(StoreError::Sled)?;

        let store = Self {
            db,
            latest,
            history,
            meta,
            write_lock: Mutex::new(()),
            hub: WatchHub::new(),
        };
        info!(revision = store.load_revision()?, "sled store ready");
        Ok(store)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StoreError::Sled)?;
        Ok(())
    }

    /// End every open watch stream
    pub fn close_watchers(&self) {
        let _guard = self.write_lock.lock();
        self.hub.close_all();
    }

    pub fn watcher_count(&self) -> usize {
        self.hub.watcher_count()
    }

    fn load_revision(&self) -> Result<i64> {
        match self.meta.get(REVISION_KEY).map_err(StoreError::Sled)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    StoreError::Backend(format!("corrupt revision record of {} bytes", bytes.len()))
                })?;
                Ok(i64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn load_latest(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        match self.latest.get(key.as_bytes()).map_err(StoreError::Sled)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(StoreError::Bincode)?)),
            None => Ok(None),
        }
    }

    fn history_key(
        key: &str,
        revision: i64,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(key.len() + 9);
        out.extend_from_slice(key.as_bytes());
        out.push(HISTORY_SEPARATOR);
        out.extend_from_slice(&(revision.max(0) as u64).to_be_bytes());
        out
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.as_bytes().contains(&HISTORY_SEPARATOR) {
            return Err(StoreError::Backend(format!("key {key:?} contains a NUL byte")).into());
        }
        Ok(())
    }

    /// Persist `records` at one new revision and notify watchers.
    ///
    /// Must be called with `write_lock` held.
    fn commit(
        &self,
        records: Vec<KeyRecord>,
    ) -> Result<i64> {
        let current = self.load_revision()?;
        if records.is_empty() {
            return Ok(current);
        }
        let revision = current + 1;

        let mut latest_ops: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::with_capacity(records.len());
        let mut history_ops: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(records.len());
        for record in &records {
            let key = record.kv.key.as_bytes().to_vec();
            let latest_value = match record.live() {
                Some(kv) => Some(bincode::serialize(kv).map_err(StoreError::Bincode)?),
                None => None,
            };
            latest_ops.push((key, latest_value));
            history_ops.push((
                Self::history_key(&record.kv.key, revision),
                bincode::serialize(record).map_err(StoreError::Bincode)?,
            ));
        }
        let revision_bytes = revision.to_be_bytes().to_vec();

        (&self.latest, &self.history, &self.meta)
            .transaction(|(latest, history, meta)| -> ConflictableTransactionResult<(), ()> {
                for (key, value) in &latest_ops {
                    match value {
                        Some(value) => {
                            latest.insert(key.as_slice(), value.as_slice())?;
                        }
                        None => {
                            latest.remove(key.as_slice())?;
                        }
                    }
                }
                for (key, value) in &history_ops {
                    history.insert(key.as_slice(), value.as_slice())?;
                }
                meta.insert(REVISION_KEY, revision_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Storage(e) => StoreError::Sled(e),
                TransactionError::Abort(()) => StoreError::Backend("sled transaction aborted".into()),
            })?;

        let events: Vec<_> = records.iter().map(KeyRecord::to_event).collect();
        self.hub.notify(&events);

        trace!(revision, ops = events.len(), "sled store commit");
        Ok(revision)
    }

    fn live_under(
        &self,
        prefix: &str,
    ) -> Result<Vec<KeyValue>> {
        let mut kvs = Vec::new();
        for item in self.latest.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(StoreError::Sled)?;
            kvs.push(bincode::deserialize::<KeyValue>(&bytes).map_err(StoreError::Bincode)?);
        }
        Ok(kvs)
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>> {
        self.load_latest(key)
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<RangeResponse> {
        // Holding the write lock gives a snapshot consistent with one revision
        let _guard = self.write_lock.lock();
        Ok(RangeResponse {
            kvs: self.live_under(prefix)?,
            revision: self.load_revision()?,
        })
    }

    async fn get_at_revision(
        &self,
        key: &str,
        revision: i64,
    ) -> Result<Option<KeyValue>> {
        let at = check_revision(revision, self.load_revision()?)?;

        let start = Self::history_key(key, 0);
        let end = Self::history_key(key, at);
        match self.history.range(start..=end).next_back() {
            Some(item) => {
                let (_, bytes) = item.map_err(StoreError::Sled)?;
                let record: KeyRecord = bincode::deserialize(&bytes).map_err(StoreError::Bincode)?;
                Ok(record.live().cloned())
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<i64> {
        Self::validate_key(key)?;
        let _guard = self.write_lock.lock();

        let record = put_record(
            self.load_latest(key)?.as_ref(),
            key,
            value,
            self.load_revision()? + 1,
        );
        self.commit(vec![record])
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock();

        if self.load_latest(key)?.is_none() {
            return Ok(0);
        }
        let record = tombstone(key, self.load_revision()? + 1);
        self.commit(vec![record])?;
        Ok(1)
    }

    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock();

        let next = self.load_revision()? + 1;
        let records: Vec<_> = self
            .live_under(prefix)?
            .iter()
            .map(|kv| tombstone(&kv.key, next))
            .collect();

        let deleted = records.len();
        self.commit(records)?;
        Ok(deleted)
    }

    async fn txn(
        &self,
        txn: Txn,
    ) -> Result<TxnResponse> {
        for op in &txn.success {
            Self::validate_key(op.key())?;
        }
        let _guard = self.write_lock.lock();

        let current = self.load_revision()?;
        match plan_txn(&txn, current + 1, |key| self.load_latest(key))? {
            TxnPlan::Rejected => Ok(TxnResponse {
                succeeded: false,
                revision: current,
            }),
            TxnPlan::Accepted { records } => Ok(TxnResponse {
                succeeded: true,
                revision: self.commit(records)?,
            }),
        }
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<WatchStream> {
        let _guard = self.write_lock.lock();

        let mut backlog = Vec::new();
        if start_revision > 0 {
            for item in self.history.scan_prefix(prefix.as_bytes()) {
                let (_, bytes) = item.map_err(StoreError::Sled)?;
                let record: KeyRecord = bincode::deserialize(&bytes).map_err(StoreError::Bincode)?;
                if record.kv.mod_revision >= start_revision {
                    backlog.push(record.to_event());
                }
            }
            backlog.sort_by_key(|e| e.kv.mod_revision);
        }

        Ok(self.hub.register(prefix, backlog))
    }

    async fn current_revision(&self) -> Result<i64> {
        self.load_revision()
    }
}
