use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::reconcile;
use super::run_watcher;
use super::ConfigInner;
use super::RealtimeConfig;
use super::RecordState;
use crate::config::validate_prefix;
use crate::ConfigRecord;
use crate::ConfigSettings;
use crate::KvStore;
use crate::Result;
use crate::SchemaRegistry;

/// Configurable builder for [`RealtimeConfig`] instances
///
/// # Typical Usage Flow
/// 1. Create with [`RealtimeConfig::builder`] or [`RealtimeConfigBuilder::new`]
/// 2. Chain configuration methods
/// 3. Finalize with `.build().await`
///
/// # Defaults
/// - Prefix: `settings.client.prefix` (`/config`)
/// - Watcher: enabled
/// - Cancellation: a fresh token
///
/// ```ignore
/// let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
/// let config = RealtimeConfig::builder(store, ServerConfig::default())
///     .prefix("/services/api")
///     .build()
///     .await?;
/// ```
pub struct RealtimeConfigBuilder<R: ConfigRecord> {
    store: Arc<dyn KvStore>,
    record: R,
    prefix: Option<String>,
    settings: ConfigSettings,
    cancellation_token: Option<CancellationToken>,
}

impl<R: ConfigRecord> RealtimeConfigBuilder<R> {
    pub fn new(
        store: Arc<dyn KvStore>,
        record: R,
    ) -> Self {
        Self {
            store,
            record,
            prefix: None,
            settings: ConfigSettings::default(),
            cancellation_token: None,
        }
    }

    /// Namespace root; overrides `settings.client.prefix`
    pub fn prefix(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Completely replaces the default settings
    pub fn settings(
        mut self,
        settings: ConfigSettings,
    ) -> Self {
        self.settings = settings;
        self
    }

    /// Parent token governing the watcher's lifetime.
    ///
    /// The client runs its watcher on a child token, so cancelling the parent
    /// stops the watcher while dropping the client never cancels the parent.
    pub fn cancellation_token(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the schema, reconcile, then start the watcher.
    ///
    /// Any failure aborts construction; no partially initialized client is
    /// returned.
    pub async fn build(self) -> Result<RealtimeConfig<R>> {
        let mut settings = self.settings;
        if let Some(prefix) = self.prefix {
            settings.client.prefix = prefix;
        }
        validate_prefix(&settings.client.prefix)?;

        let schema = SchemaRegistry::build(&self.record)?;
        let inner = Arc::new(ConfigInner {
            store: self.store,
            prefix: settings.client.prefix.clone(),
            schema,
            settings,
            state: RwLock::new(RecordState::new(self.record)),
        });

        let outcome = reconcile(&inner).await?;

        let cancel = self.cancellation_token.map(|t| t.child_token()).unwrap_or_default();

        let watcher = if inner.settings.watch.enabled {
            let stream = inner
                .store
                .watch(&inner.key_prefix(), outcome.snapshot_revision + 1)
                .await?;
            Some(tokio::spawn(run_watcher(inner.clone(), stream, cancel.clone())))
        } else {
            None
        };

        info!(
            prefix = %inner.prefix,
            fields = inner.schema.len(),
            puts = outcome.puts,
            deletes = outcome.deletes,
            watching = watcher.is_some(),
            "realtime config ready"
        );

        Ok(RealtimeConfig {
            inner,
            cancel,
            watcher: Mutex::new(watcher),
        })
    }
}
