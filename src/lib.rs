//! # d-config
//!
//! Live, typed configuration records backed by a revisioned key-value store.
//!
//! A [`ConfigRecord`] declares which of its fields are synced and under which
//! logical name. [`RealtimeConfig`] binds such a record to a key prefix:
//!
//! - on construction the store is reconciled with the record in one guarded
//!   transaction (defaults seeded, orphan keys removed, stored values loaded)
//! - a background watcher streams later writes into the record
//! - [`RealtimeConfig::set`] writes through to the store
//! - history can be walked and any field rolled back by revision or version
//!
//! Two stores ship with the crate: [`MemoryKvStore`] for tests and embedding,
//! and [`SledKvStore`] for durable single-node use. Anything implementing
//! [`KvStore`] can be plugged in.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! d_config::config_record! {
//!     #[derive(Debug, Clone)]
//!     pub struct ServerConfig {
//!         #[config("timeout")]
//!         pub timeout: i64,
//!         #[config("mode")]
//!         pub mode: String,
//!     }
//! }
//!
//! let store: Arc<dyn d_config::KvStore> = Arc::new(d_config::MemoryKvStore::new());
//! let config = d_config::RealtimeConfig::builder(store, ServerConfig { timeout: 30, mode: "production".into() })
//!     .prefix("/services/api")
//!     .build()
//!     .await?;
//!
//! config.set("timeout", 60).await?;
//! assert_eq!(config.with_record(|r| r.timeout), 60);
//! ```

mod client;
mod config;
mod errors;
mod schema;
mod store;
mod utils;
mod value;

pub mod metrics;

pub use client::*;
pub use config::*;
pub use errors::*;
pub use schema::*;
pub use store::*;
pub use value::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
