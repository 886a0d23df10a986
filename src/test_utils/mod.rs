//! Records and helpers shared by the unit tests
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config_record;
use crate::ConfigRecord;
use crate::KvStore;
use crate::MemoryKvStore;
use crate::RealtimeConfig;
use crate::Result;

config_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct AppConfig {
        #[config("timeout")]
        pub(crate) timeout: i64,
        #[config("mode")]
        pub(crate) mode: String,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            mode: "production".to_string(),
        }
    }
}

config_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct CounterConfig {
        #[config("counter")]
        pub(crate) counter: i64,
    }
}

config_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct ComplexConfig {
        #[config("limits")]
        pub(crate) limits: BTreeMap<String, i64>,
        #[config("hosts")]
        pub(crate) hosts: Vec<String>,
        #[config("features")]
        pub(crate) features: BTreeSet<String>,
        #[config("poll_interval")]
        pub(crate) poll_interval: Duration,
    }
}

config_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct LimitConfig {
        #[config("max_bytes")]
        pub(crate) max_bytes: i64,
        #[config("max_items")]
        pub(crate) max_items: u64,
    }
}

/// Both fields default to "unlimited"
impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_bytes: i64::MAX,
            max_items: u64::MAX,
        }
    }
}

pub(crate) fn memory_store() -> (Arc<MemoryKvStore>, Arc<dyn KvStore>) {
    let store = Arc::new(MemoryKvStore::new());
    let dyn_store: Arc<dyn KvStore> = store.clone();
    (store, dyn_store)
}

pub(crate) async fn build_config<R: ConfigRecord>(
    store: Arc<dyn KvStore>,
    record: R,
    prefix: &str,
) -> Result<RealtimeConfig<R>> {
    RealtimeConfig::builder(store, record).prefix(prefix).build().await
}

/// Poll `check` every millisecond until it holds or `timeout` elapses
pub(crate) async fn wait_until(
    timeout: Duration,
    mut check: impl FnMut() -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
