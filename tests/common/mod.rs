use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use d_config::config_record;
use d_config::ConfigRecord;
use d_config::KvStore;
use d_config::MemoryKvStore;
use d_config::RealtimeConfig;
use d_config::Result;

config_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServiceConfig {
        #[config("timeout")]
        pub timeout: i64,
        #[config("mode")]
        pub mode: String,
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            mode: "production".to_string(),
        }
    }
}

config_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct CounterConfig {
        #[config("counter")]
        pub counter: i64,
    }
}

config_record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ComplexConfig {
        #[config("limits")]
        pub limits: BTreeMap<String, i64>,
        #[config("hosts")]
        pub hosts: Vec<String>,
        #[config("weights")]
        pub weights: [u8; 3],
        #[config("features")]
        pub features: BTreeSet<String>,
        #[config("poll_interval")]
        pub poll_interval: Duration,
    }
}

pub fn memory_store() -> (Arc<MemoryKvStore>, Arc<dyn KvStore>) {
    let store = Arc::new(MemoryKvStore::new());
    let dyn_store: Arc<dyn KvStore> = store.clone();
    (store, dyn_store)
}

pub async fn build<R: ConfigRecord>(
    store: &Arc<dyn KvStore>,
    record: R,
    prefix: &str,
) -> Result<RealtimeConfig<R>> {
    RealtimeConfig::builder(store.clone(), record)
        .prefix(prefix)
        .build()
        .await
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until(
    timeout: Duration,
    mut check: impl FnMut() -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    true
}
