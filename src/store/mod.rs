//! Revisioned, watchable key-value store
//!
//! [`KvStore`] is the narrow interface the client consumes: single and
//! prefix reads, point-in-time reads, puts, deletes, atomic transactions and
//! prefix watches. Two implementations ship with the crate:
//!
//! - [`MemoryKvStore`]: process-local, used by tests and embedded setups
//! - [`SledKvStore`]: persisted in sled trees
//!
//! Both follow the same MVCC rules:
//! - the store revision starts at 0 and each committed write advances it by one
//! - every operation inside one transaction shares the transaction's revision
//! - a key's version starts at 1 on creation, increments per modification and
//!   resets when the key is deleted and recreated
//! - deleting an absent key is a no-op and does not advance the revision

mod memory;
mod mvcc;
mod sled_store;
mod watch_hub;

pub use memory::*;
pub(crate) use mvcc::*;
pub use sled_store::*;
pub use watch_hub::*;

#[cfg(test)]
mod sled_store_test;

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::Result;

/// A key as observed at some revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Revision that created the current incarnation of the key
    pub create_revision: i64,
    /// Revision of the last modification
    pub mod_revision: i64,
    /// Per-key modification counter
    pub version: i64,
}

/// Result of a prefix read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    /// Matching keys in key order
    pub kvs: Vec<KeyValue>,
    /// Store revision the read was served at
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// One change observed by a watcher
///
/// For deletes `kv.value` is empty, `kv.version` is 0 and `kv.mod_revision`
/// is the revision of the delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub kv: KeyValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl TxnOp {
    pub fn key(&self) -> &str {
        match self {
            TxnOp::Put { key, .. } | TxnOp::Delete { key } => key,
        }
    }
}

/// Guard evaluated against the latest state before a transaction applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compare {
    /// The key does not exist
    Absent(String),
    /// The key's modification revision equals `revision` (0 for an absent key)
    ModRevision { key: String, revision: i64 },
}

/// Atomic multi-operation write
///
/// Either every operation in `success` applies at one new revision, or, if
/// any compare fails, nothing does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txn {
    pub compares: Vec<Compare>,
    pub success: Vec<TxnOp>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(
        mut self,
        compare: Compare,
    ) -> Self {
        self.compares.push(compare);
        self
    }

    pub fn and_then(
        mut self,
        op: TxnOp,
    ) -> Self {
        self.success.push(op);
        self
    }

    pub fn put(
        self,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> Self {
        self.and_then(TxnOp::Put {
            key: key.into(),
            value,
        })
    }

    pub fn delete(
        self,
        key: impl Into<String>,
    ) -> Self {
        self.and_then(TxnOp::Delete { key: key.into() })
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnResponse {
    /// False when a compare failed and nothing was written
    pub succeeded: bool,
    /// Store revision after the transaction
    pub revision: i64,
}

/// Ordered stream of changes under a prefix
///
/// Ends when the store closes it. Dropping the stream unregisters the
/// watcher.
pub struct WatchStream {
    inner: UnboundedReceiverStream<WatchEvent>,
    _guard: Option<WatcherGuard>,
}

impl WatchStream {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<WatchEvent>,
        guard: Option<WatcherGuard>,
    ) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver),
            _guard: guard,
        }
    }
}

impl std::fmt::Debug for WatchStream {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchStream").finish_non_exhaustive()
    }
}

impl Stream for WatchStream {
    type Item = WatchEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Store primitives consumed by the configuration client
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KeyValue>>;

    /// All live keys starting with `prefix`, as of one revision
    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<RangeResponse>;

    /// The key as it was at `revision`. A revision of 0 or below reads the
    /// latest state.
    ///
    /// # Errors
    /// [`StoreError::FutureRevision`](crate::StoreError::FutureRevision) if
    /// `revision` is beyond the current revision
    async fn get_at_revision(
        &self,
        key: &str,
        revision: i64,
    ) -> Result<Option<KeyValue>>;

    /// Returns the revision of the write
    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<i64>;

    /// Returns the number of keys deleted
    async fn delete(
        &self,
        key: &str,
    ) -> Result<usize>;

    /// Returns the number of keys deleted
    async fn delete_prefix(
        &self,
        prefix: &str,
    ) -> Result<usize>;

    async fn txn(
        &self,
        txn: Txn,
    ) -> Result<TxnResponse>;

    /// Subscribe to changes under `prefix`.
    ///
    /// With `start_revision > 0` every retained change at or after that
    /// revision is replayed before live events.
    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<WatchStream>;

    async fn current_revision(&self) -> Result<i64>;
}
