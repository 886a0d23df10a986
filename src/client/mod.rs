//! Live configuration client
//!
//! [`RealtimeConfig`] binds the fields of a [`ConfigRecord`] to keys under a
//! prefix. Construction reconciles the store with the record's defaults, then
//! a background watcher streams later changes into the record.
//!
//! # Mutation discipline
//! The record sits behind one [`RwLock`] together with the store revision
//! last applied to each slot. Both [`RealtimeConfig::set`] and the watcher
//! apply a value only if its modification revision is newer than the slot's,
//! so any interleaving of local writes and watch events ends on the value of
//! the store's latest write.

mod builder;
mod history;
mod reconcile;
mod watcher;

pub use builder::*;
pub use history::*;
pub(crate) use reconcile::*;
pub(crate) use watcher::*;


use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::coerce;
use crate::utils::ScopedTimer;
use crate::CoercionError;
use crate::ConfigField;
use crate::ConfigRecord;
use crate::ConfigSettings;
use crate::Error;
use crate::FieldValue;
use crate::KvStore;
use crate::Result;
use crate::SchemaEntry;
use crate::SchemaRegistry;
use crate::Value;

/// The record plus the store revision last applied to each slot
pub(crate) struct RecordState<R> {
    pub(crate) record: R,
    pub(crate) applied: HashMap<usize, i64>,
}

impl<R: ConfigRecord> RecordState<R> {
    pub(crate) fn new(record: R) -> Self {
        Self {
            record,
            applied: HashMap::new(),
        }
    }

    /// Write `value` into `slot` unless the slot already reflects `revision`
    /// or a newer one. Returns whether the record changed hands.
    pub(crate) fn apply(
        &mut self,
        slot: usize,
        value: FieldValue,
        revision: i64,
    ) -> std::result::Result<bool, CoercionError> {
        if self.applied.get(&slot).is_some_and(|&seen| seen >= revision) {
            return Ok(false);
        }

        self.record.set_field(slot, value)?;
        self.applied.insert(slot, revision);
        Ok(true)
    }
}

/// State shared between the client handle and its watcher task
pub(crate) struct ConfigInner<R> {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) prefix: String,
    pub(crate) schema: SchemaRegistry,
    pub(crate) settings: ConfigSettings,
    pub(crate) state: RwLock<RecordState<R>>,
}

impl<R: ConfigRecord> ConfigInner<R> {
    /// `{prefix}/`, the scope of every read, watch and orphan scan
    pub(crate) fn key_prefix(&self) -> String {
        format!("{}/", self.prefix)
    }

    pub(crate) fn key_for(
        &self,
        name: &str,
    ) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// Schema entry a stored key belongs to
    pub(crate) fn entry_for_key(
        &self,
        key: &str,
    ) -> Option<&SchemaEntry> {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|name| self.schema.get(name))
    }

    pub(crate) fn entry(
        &self,
        name: &str,
    ) -> Result<&SchemaEntry> {
        self.schema
            .get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))
    }

    /// Decode a stored payload and coerce it into the entry's type
    pub(crate) fn decode_for(
        &self,
        entry: &SchemaEntry,
        key: &str,
        payload: &[u8],
    ) -> Result<FieldValue> {
        let value = Value::decode(payload).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })?;
        Ok(coerce(&value, &entry.field_type)?)
    }

    /// Persist an already-typed value, then apply it to the slot.
    ///
    /// Returns the revision of the write.
    pub(crate) async fn store_and_apply(
        &self,
        entry: &SchemaEntry,
        value: FieldValue,
    ) -> Result<i64> {
        let payload = serde_json::to_vec(&value).map_err(|source| Error::Encode {
            name: entry.name.clone(),
            source,
        })?;

        let key = self.key_for(&entry.name);
        let revision = {
            let _timer = ScopedTimer::new("config::put");
            self.store.put(&key, payload).await?
        };

        let applied = self.state.write().apply(entry.slot, value, revision)?;
        if !applied {
            debug!(name = %entry.name, revision, "slot already holds a newer write");
        }
        Ok(revision)
    }
}

/// Typed configuration record kept in sync with a key-value store
///
/// Dropping the handle cancels the background watcher; [`shutdown`](Self::shutdown)
/// additionally waits for it to exit.
pub struct RealtimeConfig<R: ConfigRecord> {
    pub(crate) inner: Arc<ConfigInner<R>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ConfigRecord> std::fmt::Debug for RealtimeConfig<R> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("prefix", &self.inner.prefix)
            .field("fields", &self.inner.schema.len())
            .finish()
    }
}

impl<R: ConfigRecord> RealtimeConfig<R> {
    pub fn builder(
        store: Arc<dyn KvStore>,
        record: R,
    ) -> RealtimeConfigBuilder<R> {
        RealtimeConfigBuilder::new(store, record)
    }

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.inner.schema
    }

    /// Read `name` from the store, bypassing the local record.
    ///
    /// # Errors
    /// - [`Error::UnknownField`] if `name` is not in the schema
    /// - [`Error::NotFound`] if the key is absent from the store
    /// - [`Error::Decode`] / [`Error::Coercion`] if the payload does not fit
    pub async fn get(
        &self,
        name: &str,
    ) -> Result<FieldValue> {
        let entry = self.inner.entry(name)?;
        let key = self.inner.key_for(name);

        let kv = {
            let _timer = ScopedTimer::new("config::get");
            self.inner.store.get(&key).await?
        };
        let kv = kv.ok_or_else(|| Error::NotFound { key: key.clone() })?;

        self.inner.decode_for(entry, &key, &kv.value)
    }

    /// [`get`](Self::get) converted into the field's Rust type
    pub async fn get_typed<T: ConfigField>(
        &self,
        name: &str,
    ) -> Result<T> {
        Ok(self.get(name).await?.into_typed()?)
    }

    /// Current in-memory value of `name`
    pub fn get_local(
        &self,
        name: &str,
    ) -> Result<FieldValue> {
        let entry = self.inner.entry(name)?;
        self.inner
            .state
            .read()
            .record
            .get_field(entry.slot)
            .ok_or_else(|| CoercionError::UnknownSlot(entry.slot).into())
    }

    /// Run `f` against the record under the read lock
    pub fn with_record<T>(
        &self,
        f: impl FnOnce(&R) -> T,
    ) -> T {
        f(&self.inner.state.read().record)
    }

    pub fn snapshot(&self) -> R
    where
        R: Clone,
    {
        self.inner.state.read().record.clone()
    }

    /// Coerce `value` into the field's type, persist it, then update the slot.
    ///
    /// Success is signalled only after both the store write and the local
    /// update have completed.
    pub async fn set(
        &self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let entry = self.inner.entry(name)?;
        let typed = coerce(&value.into(), &entry.field_type)?;
        let revision = self.inner.store_and_apply(entry, typed).await?;

        debug!(name, revision, "config field set");
        Ok(())
    }

    /// Cancel the watcher and wait for it to exit.
    ///
    /// Waits at most `watch.shutdown_timeout_ms`; a watcher that does not stop
    /// in time is aborted.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();

        let handle = self.watcher.lock().take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        let timeout = self.inner.settings.watch.shutdown_timeout();
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => {
                joined?;
                debug!(prefix = %self.inner.prefix, "watcher stopped");
            }
            Err(_) => {
                warn!(prefix = %self.inner.prefix, ?timeout, "watcher did not stop in time, aborting");
                handle.abort();
            }
        }
        Ok(())
    }

    /// Whether the background watcher is still running
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<R: ConfigRecord> Drop for RealtimeConfig<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
