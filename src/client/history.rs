//! Revision history and rollback
//!
//! History is reconstructed on demand from point-in-time reads; nothing is
//! persisted on the side. Each walk starts at a key's latest modification
//! revision (or `from_revision`, if older), reads the key as of that
//! revision, then jumps straight to the revision before the observed
//! modification, until it passes the key's creation revision. The cost is one
//! store round-trip per distinct version visited.
//!
//! Every rollback is an explicit new write through the same path as
//! [`RealtimeConfig::set`]; the store's revision counter never moves back.

use std::collections::HashSet;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ConfigInner;
use super::RealtimeConfig;
use crate::metrics::ROLLBACKS;
use crate::ConfigRecord;
use crate::Error;
use crate::FieldValue;
use crate::HistoryError;
use crate::HistorySettings;
use crate::KeyValue;
use crate::Result;
use crate::SchemaEntry;
use crate::StoreError;

/// A past observation of one field
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Full store key
    pub key: String,
    /// Logical field name
    pub name: String,
    pub value: FieldValue,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub version: i64,
}

/// Caps the number of point-in-time reads of one history call
struct ScanBudget {
    remaining: Option<u64>,
}

impl ScanBudget {
    fn new(settings: &HistorySettings) -> Self {
        Self {
            remaining: settings
                .is_bounded()
                .then_some(settings.max_revisions_scanned),
        }
    }

    /// Consume one read; false once the budget is spent
    fn take(&mut self) -> bool {
        match &mut self.remaining {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

impl<R: ConfigRecord> ConfigInner<R> {
    /// Point-in-time read that reports a future revision as "not found"
    async fn read_at(
        &self,
        key: &str,
        revision: i64,
    ) -> Result<Option<KeyValue>> {
        match self.store.get_at_revision(key, revision).await {
            Err(Error::Store(StoreError::FutureRevision { .. })) => Err(HistoryError::RevisionNotFound {
                key: key.to_string(),
                revision,
            }
            .into()),
            other => other,
        }
    }

    async fn collect_history(
        &self,
        kvs: Vec<KeyValue>,
        from_revision: i64,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let mut budget = ScanBudget::new(&self.settings.history);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        'keys: for kv in kvs {
            let Some(entry) = self.entry_for_key(&kv.key) else {
                continue;
            };

            let mut revision = kv.mod_revision;
            if from_revision > 0 && from_revision < revision {
                revision = from_revision;
            }
            if kv.create_revision > revision {
                continue;
            }

            while revision >= kv.create_revision {
                if !budget.take() {
                    warn!(
                        prefix = %self.prefix,
                        max = self.settings.history.max_revisions_scanned,
                        "history scan budget exhausted, returning partial history"
                    );
                    break 'keys;
                }

                let Some(observed) = self.store.get_at_revision(&kv.key, revision).await? else {
                    break;
                };
                revision = observed.mod_revision - 1;

                if !seen.insert((observed.key.clone(), observed.mod_revision)) {
                    continue;
                }
                match self.history_entry(entry, observed) {
                    Some(history) => entries.push(history),
                    None => continue,
                }
            }
        }

        entries.sort_by(|a, b| b.mod_revision.cmp(&a.mod_revision).then_with(|| a.key.cmp(&b.key)));
        if limit > 0 {
            entries.truncate(limit as usize);
        }
        Ok(entries)
    }

    fn history_entry(
        &self,
        entry: &SchemaEntry,
        observed: KeyValue,
    ) -> Option<HistoryEntry> {
        match self.decode_for(entry, &observed.key, &observed.value) {
            Ok(value) => Some(HistoryEntry {
                name: entry.name.clone(),
                value,
                create_revision: observed.create_revision,
                mod_revision: observed.mod_revision,
                version: observed.version,
                key: observed.key,
            }),
            Err(e) => {
                debug!(key = %observed.key, revision = observed.mod_revision, "skipping history entry: {}", e);
                None
            }
        }
    }
}

impl<R: ConfigRecord> RealtimeConfig<R> {
    /// History of every field under the prefix, most recent first.
    ///
    /// `from_revision <= 0` starts from each key's latest revision;
    /// `limit <= 0` returns everything.
    pub async fn get_history(
        &self,
        from_revision: i64,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let range = self.inner.store.get_prefix(&self.inner.key_prefix()).await?;
        self.inner.collect_history(range.kvs, from_revision, limit).await
    }

    /// History of one field, most recent first.
    ///
    /// A key currently absent from the store has no history.
    ///
    /// # Errors
    /// [`Error::UnknownField`](crate::Error::UnknownField) for names outside the schema
    pub async fn get_key_history(
        &self,
        name: &str,
        from_revision: i64,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        self.inner.entry(name)?;

        let key = self.inner.key_for(name);
        match self.inner.store.get(&key).await? {
            Some(kv) => self.inner.collect_history(vec![kv], from_revision, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Set `name` back to the value it held at `revision`.
    ///
    /// # Errors
    /// [`HistoryError::RevisionNotFound`] if `revision` is not positive or the
    /// key held no value at it
    pub async fn rollback_key_by_revision(
        &self,
        name: &str,
        revision: i64,
    ) -> Result<()> {
        let entry = self.inner.entry(name)?;
        let key = self.inner.key_for(name);
        if revision <= 0 {
            return Err(HistoryError::RevisionNotFound { key, revision }.into());
        }

        let observed = self
            .inner
            .read_at(&key, revision)
            .await?
            .ok_or_else(|| HistoryError::RevisionNotFound {
                key: key.clone(),
                revision,
            })?;

        let value = self.inner.decode_for(entry, &key, &observed.value)?;
        let written = self.inner.store_and_apply(entry, value).await?;

        ROLLBACKS.with_label_values(&["revision"]).inc();
        info!(name, revision, written, "rolled back by revision");
        Ok(())
    }

    /// Set `name` back to the value it held at per-key `version`.
    ///
    /// # Errors
    /// - [`HistoryError::KeyNotFound`] if the key is absent from the store
    /// - [`HistoryError::VersionNotFound`] if the current incarnation of the
    ///   key never had that version
    pub async fn rollback_key_by_version(
        &self,
        name: &str,
        version: i64,
    ) -> Result<()> {
        let entry = self.inner.entry(name)?;
        let key = self.inner.key_for(name);

        let latest = self
            .inner
            .store
            .get(&key)
            .await?
            .ok_or_else(|| HistoryError::KeyNotFound { key: key.clone() })?;

        let mut revision = latest.mod_revision;
        while revision >= latest.create_revision {
            let Some(observed) = self.inner.store.get_at_revision(&key, revision).await? else {
                break;
            };

            if observed.version == version {
                let value = self.inner.decode_for(entry, &key, &observed.value)?;
                let written = self.inner.store_and_apply(entry, value).await?;

                ROLLBACKS.with_label_values(&["version"]).inc();
                info!(name, version, written, "rolled back by version");
                return Ok(());
            }
            if observed.version < version {
                break;
            }
            revision = observed.mod_revision - 1;
        }

        Err(HistoryError::VersionNotFound { key, version }.into())
    }

    /// Re-apply the single most recent change at or before `revision`, across
    /// the whole prefix.
    ///
    /// Exactly one field is written. Use [`rollback_record`](Self::rollback_record)
    /// to restore every field.
    ///
    /// # Errors
    /// [`HistoryError::RevisionNotFound`] if `revision` is in the future or no
    /// field has history at or before it
    pub async fn rollback_config(
        &self,
        revision: i64,
    ) -> Result<()> {
        let not_found = || HistoryError::RevisionNotFound {
            key: self.inner.prefix.clone(),
            revision,
        };

        let current = self.inner.store.current_revision().await?;
        if revision <= 0 || revision > current {
            return Err(not_found().into());
        }

        let latest = self
            .get_history(revision, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;

        let entry = self.inner.entry(&latest.name)?;
        let written = self.inner.store_and_apply(entry, latest.value).await?;

        ROLLBACKS.with_label_values(&["config"]).inc();
        info!(
            name = %latest.name,
            revision,
            source_revision = latest.mod_revision,
            written,
            "rolled back one field"
        );
        Ok(())
    }

    /// Restore every field to the value it held at `revision`.
    ///
    /// Fields that did not exist at `revision` keep their current value.
    /// Returns the number of fields written.
    ///
    /// # Errors
    /// [`HistoryError::RevisionNotFound`] if `revision` is not positive, is in
    /// the future, or no field existed at it
    pub async fn rollback_record(
        &self,
        revision: i64,
    ) -> Result<usize> {
        if revision <= 0 {
            return Err(HistoryError::RevisionNotFound {
                key: self.inner.prefix.clone(),
                revision,
            }
            .into());
        }

        let mut restored = Vec::new();
        for entry in self.inner.schema.entries() {
            let key = self.inner.key_for(&entry.name);
            if let Some(observed) = self.inner.read_at(&key, revision).await? {
                let value = self.inner.decode_for(entry, &key, &observed.value)?;
                restored.push((entry, value));
            }
        }

        if restored.is_empty() {
            return Err(HistoryError::RevisionNotFound {
                key: self.inner.prefix.clone(),
                revision,
            }
            .into());
        }

        let count = restored.len();
        for (entry, value) in restored {
            self.inner.store_and_apply(entry, value).await?;
        }

        ROLLBACKS.with_label_values(&["record"]).inc();
        info!(prefix = %self.inner.prefix, revision, fields = count, "rolled back record");
        Ok(count)
    }
}
