//! Live Configuration Error Hierarchy
//!
//! Defines the closed error taxonomy of the configuration overlay,
//! categorized by the component that raises it:
//!
//! - construction time: [`SchemaError`], [`ReconcileError`]
//! - value shape: [`CoercionError`], [`Error::Encode`], [`Error::Decode`]
//! - caller mistakes: [`Error::UnknownField`]
//! - backend: [`StoreError`]
//! - history and rollback: [`HistoryError`]

use config::ConfigError;
use tokio::task::JoinError;

use crate::FieldType;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Record declaration could not be turned into a schema (fatal)
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Initial reconciliation failed (fatal to construction)
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Value could not be coerced into the declared field type
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// Value could not be serialized for the store
    #[error("Failed to encode value for field {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored payload is not valid JSON
    #[error("Failed to decode value stored at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Caller referenced a name that is not part of the schema
    #[error("Unknown config field: {0}")]
    UnknownField(String),

    /// Key is part of the schema but absent from the store
    #[error("Key not found in store: {key}")]
    NotFound { key: String },

    /// Backend failures (transport, storage, serialization)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// History lookups and rollbacks
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Settings loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Background watcher task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A field intended for sync declares no logical name
    #[error("Field {field} is missing its config name")]
    MissingName { field: String },

    /// The record does not expose a readable slot for a declared field
    #[error("Field {field} (slot {slot}) is not addressable on the record")]
    NotAddressable { field: String, slot: usize },

    /// Two fields claim the same logical name
    #[error("Config name {name} is declared by both {first} and {second}")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    /// No specialized rule or generic conversion applies
    #[error("Cannot convert {from} to {to}")]
    Mismatch { from: &'static str, to: FieldType },

    /// Numeric value does not fit the declared integer width
    #[error("Value {value} is out of range for {to}")]
    OutOfRange { value: f64, to: FieldType },

    /// Fixed-length sequence received the wrong number of elements
    #[error("Expected {expected} elements, got {actual}")]
    Length { expected: usize, actual: usize },

    /// Text is not a valid duration such as `5s` or `1h30m`
    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    /// Record has no field behind the requested slot
    #[error("Record has no field at slot {0}")]
    UnknownSlot(usize),

    /// Nested coercion failure inside a sequence or mapping
    #[error("At {path}: {source}")]
    Nested {
        path: String,
        #[source]
        source: Box<CoercionError>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Generic backend failure with context
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Point-in-time read beyond the store's current revision
    #[error("Required revision {requested} is a future revision (current: {current})")]
    FutureRevision { requested: i64, current: i64 },

    /// Watch stream or store handle has been closed
    #[error("Store is closed")]
    Closed,

    /// Embedded database errors
    #[error(transparent)]
    Sled(#[from] sled::Error),

    /// Serialization failures for persisted records
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// A concurrent writer changed the prefix between snapshot and commit
    #[error("Reconcile transaction conflict under prefix {prefix}")]
    Conflict { prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("Revision {revision} not found for key {key}")]
    RevisionNotFound { key: String, revision: i64 },

    #[error("Version {version} not found for key {key}")]
    VersionNotFound { key: String, version: i64 },

    #[error("Key {key} not found")]
    KeyNotFound { key: String },
}
