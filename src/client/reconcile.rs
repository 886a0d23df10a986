//! First-sync protocol run once at construction
//!
//! 1. Read everything under `{prefix}/` as of one revision.
//! 2. Known keys: coerce into the record (the store is authoritative).
//! 3. Schema entries missing from the store: stage a put of the default,
//!    guarded by [`Compare::Absent`].
//! 4. Orphan keys: stage a delete, guarded by [`Compare::ModRevision`].
//! 5. Commit the staged operations as one transaction. A failed guard means
//!    another writer got there first and surfaces as
//!    [`ReconcileError::Conflict`]; there is no retry.

use std::collections::HashSet;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ConfigInner;
use crate::metrics::RECONCILE_OPS;
use crate::utils::ScopedTimer;
use crate::CoercionError;
use crate::Compare;
use crate::ConfigRecord;
use crate::Error;
use crate::ReconcileError;
use crate::Result;
use crate::Txn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReconcileOutcome {
    /// Revision of the prefix snapshot the diff was computed against
    pub(crate) snapshot_revision: i64,
    /// Revision of the committed transaction, if one was needed
    pub(crate) commit_revision: Option<i64>,
    pub(crate) puts: usize,
    pub(crate) deletes: usize,
    /// Slots overwritten from stored values
    pub(crate) loaded: usize,
}

pub(crate) async fn reconcile<R: ConfigRecord>(inner: &ConfigInner<R>) -> Result<ReconcileOutcome> {
    let _timer = ScopedTimer::new("config::reconcile");
    let key_prefix = inner.key_prefix();

    let snapshot = inner.store.get_prefix(&key_prefix).await?;
    let mut outcome = ReconcileOutcome {
        snapshot_revision: snapshot.revision,
        ..Default::default()
    };

    let mut txn = Txn::new();
    let mut present = HashSet::new();

    {
        let mut state = inner.state.write();

        for kv in &snapshot.kvs {
            let Some(entry) = inner.entry_for_key(&kv.key) else {
                debug!(key = %kv.key, "staging orphan delete");
                txn = txn
                    .when(Compare::ModRevision {
                        key: kv.key.clone(),
                        revision: kv.mod_revision,
                    })
                    .delete(kv.key.clone());
                outcome.deletes += 1;
                continue;
            };

            let typed = inner.decode_for(entry, &kv.key, &kv.value)?;
            present.insert(entry.slot);

            let current = state.record.get_field(entry.slot);
            if current.as_ref() == Some(&typed) {
                state.applied.insert(entry.slot, kv.mod_revision);
            } else if state.apply(entry.slot, typed, kv.mod_revision)? {
                outcome.loaded += 1;
            }
        }

        for entry in inner.schema.entries().filter(|e| !present.contains(&e.slot)) {
            let default = state
                .record
                .get_field(entry.slot)
                .ok_or(CoercionError::UnknownSlot(entry.slot))?;
            let payload = serde_json::to_vec(&default).map_err(|source| Error::Encode {
                name: entry.name.clone(),
                source,
            })?;

            let key = inner.key_for(&entry.name);
            debug!(key = %key, "staging default put");
            txn = txn.when(Compare::Absent(key.clone())).put(key, payload);
            outcome.puts += 1;
        }
    }

    if txn.is_empty() {
        debug!(prefix = %inner.prefix, revision = snapshot.revision, "store already reconciled");
        return Ok(outcome);
    }

    let resp = inner.store.txn(txn).await?;
    if !resp.succeeded {
        warn!(prefix = %inner.prefix, "reconcile transaction lost a race with another writer");
        return Err(ReconcileError::Conflict {
            prefix: inner.prefix.clone(),
        }
        .into());
    }

    RECONCILE_OPS.with_label_values(&["put"]).inc_by(outcome.puts as u64);
    RECONCILE_OPS.with_label_values(&["delete"]).inc_by(outcome.deletes as u64);

    outcome.commit_revision = Some(resp.revision);
    info!(
        prefix = %inner.prefix,
        revision = resp.revision,
        puts = outcome.puts,
        deletes = outcome.deletes,
        "reconcile committed"
    );
    Ok(outcome)
}
