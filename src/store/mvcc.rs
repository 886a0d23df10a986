//! Revision bookkeeping shared by the store backends.

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use super::Compare;
use super::EventKind;
use super::KeyValue;
use super::Txn;
use super::TxnOp;
use super::WatchEvent;
use crate::Result;
use crate::StoreError;

/// One entry in a key's history: a live value or a tombstone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyRecord {
    pub(crate) kv: KeyValue,
    pub(crate) deleted: bool,
}

impl KeyRecord {
    pub(crate) fn live(&self) -> Option<&KeyValue> {
        (!self.deleted).then_some(&self.kv)
    }

    pub(crate) fn to_event(&self) -> WatchEvent {
        WatchEvent {
            kind: if self.deleted {
                EventKind::Delete
            } else {
                EventKind::Put
            },
            kv: self.kv.clone(),
        }
    }
}

pub(crate) fn put_record(
    latest: Option<&KeyValue>,
    key: &str,
    value: Vec<u8>,
    revision: i64,
) -> KeyRecord {
    let (create_revision, version) = match latest {
        Some(kv) => (kv.create_revision, kv.version + 1),
        None => (revision, 1),
    };

    KeyRecord {
        kv: KeyValue {
            key: key.to_string(),
            value,
            create_revision,
            mod_revision: revision,
            version,
        },
        deleted: false,
    }
}

pub(crate) fn tombstone(
    key: &str,
    revision: i64,
) -> KeyRecord {
    KeyRecord {
        kv: KeyValue {
            key: key.to_string(),
            value: Vec::new(),
            create_revision: 0,
            mod_revision: revision,
            version: 0,
        },
        deleted: true,
    }
}

/// Latest record at or before `revision`, resolved to a live value
///
/// `history` must be ordered by ascending modification revision.
pub(crate) fn visible_at(
    history: &[KeyRecord],
    revision: i64,
) -> Option<&KeyValue> {
    history
        .iter()
        .rev()
        .find(|r| r.kv.mod_revision <= revision)
        .and_then(KeyRecord::live)
}

pub(crate) fn compare_holds(
    compare: &Compare,
    latest: Option<&KeyValue>,
) -> bool {
    match compare {
        Compare::Absent(_) => latest.is_none(),
        Compare::ModRevision { revision, .. } => latest.map_or(0, |kv| kv.mod_revision) == *revision,
    }
}

pub(crate) fn compare_key(compare: &Compare) -> &str {
    match compare {
        Compare::Absent(key) | Compare::ModRevision { key, .. } => key,
    }
}

pub(crate) fn check_revision(
    requested: i64,
    current: i64,
) -> Result<i64> {
    if requested > current {
        return Err(StoreError::FutureRevision { requested, current }.into());
    }
    Ok(if requested <= 0 { current } else { requested })
}

/// Outcome of evaluating a transaction against the latest state
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TxnPlan {
    /// A compare failed
    Rejected,
    /// Compares held; `records` are the writes to commit (possibly none)
    Accepted { records: Vec<KeyRecord> },
}

/// Evaluate `txn` at `next_revision`.
///
/// `lookup` returns the latest live value of a key. Deletes of absent keys are
/// dropped from the plan. A key may appear at most once among the operations.
pub(crate) fn plan_txn<F>(
    txn: &Txn,
    next_revision: i64,
    mut lookup: F,
) -> Result<TxnPlan>
where
    F: FnMut(&str) -> Result<Option<KeyValue>>,
{
    for compare in &txn.compares {
        let latest = lookup(compare_key(compare))?;
        if !compare_holds(compare, latest.as_ref()) {
            return Ok(TxnPlan::Rejected);
        }
    }

    let mut seen = HashSet::with_capacity(txn.success.len());
    let mut records = Vec::with_capacity(txn.success.len());

    for op in &txn.success {
        if !seen.insert(op.key()) {
            return Err(StoreError::Backend(format!("duplicate key {} in transaction", op.key())).into());
        }

        let latest = lookup(op.key())?;
        match op {
            TxnOp::Put { key, value } => {
                records.push(put_record(latest.as_ref(), key, value.clone(), next_revision));
            }
            TxnOp::Delete { key } => {
                if latest.is_some() {
                    records.push(tombstone(key, next_revision));
                }
            }
        }
    }

    Ok(TxnPlan::Accepted { records })
}
