use std::sync::Arc;

use d_config::config_record;
use d_config::Error;
use d_config::KvStore;
use d_config::ReconcileError;
use d_config::SchemaError;

use crate::common::build;
use crate::common::memory_store;
use crate::common::CounterConfig;
use crate::common::ServiceConfig;

config_record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct ServiceConfigV2 {
        #[config("timeout")]
        pub timeout: i64,
        #[config("retries")]
        pub retries: u32,
    }
}

impl Default for ServiceConfigV2 {
    fn default() -> Self {
        Self { timeout: 10, retries: 3 }
    }
}

config_record! {
    #[derive(Debug, Clone, Default)]
    pub struct ClashingConfig {
        #[config("port")]
        pub port: u16,
        #[config("port")]
        pub admin_port: u16,
    }
}

config_record! {
    #[derive(Debug, Clone, Default)]
    pub struct UnnamedConfig {
        #[config("")]
        pub port: u16,
    }
}

#[tokio::test]
async fn test_empty_store_gets_defaults_in_one_revision() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();

    assert_eq!(store.current_revision().await.unwrap(), 1);
    let range = store.get_prefix("/svc/").await.unwrap();
    assert_eq!(range.kvs.len(), 2);
    assert!(range.kvs.iter().all(|kv| kv.mod_revision == 1 && kv.version == 1));
    assert_eq!(config.snapshot(), ServiceConfig::default());
}

#[tokio::test]
async fn test_new_schema_drops_orphans_and_keeps_shared_values() {
    let (_, store) = memory_store();
    let v1 = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    v1.set("timeout", 45).await.unwrap();
    v1.shutdown().await.unwrap();
    drop(v1);

    let v2 = build(&store, ServiceConfigV2::default(), "/svc").await.unwrap();
    assert_eq!(
        v2.snapshot(),
        ServiceConfigV2 {
            timeout: 45,
            retries: 3
        }
    );

    assert!(store.get("/svc/mode").await.unwrap().is_none());
    let retries = store.get("/svc/retries").await.unwrap().unwrap();
    assert_eq!(retries.value, b"3");
    // Orphan delete and default put share one revision
    assert_eq!(retries.mod_revision, store.current_revision().await.unwrap());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (_, store) = memory_store();
    build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    let revision = store.current_revision().await.unwrap();

    for _ in 0..3 {
        build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    }
    assert_eq!(store.current_revision().await.unwrap(), revision);
}

#[tokio::test]
async fn test_prefixes_do_not_interfere() {
    let (_, store) = memory_store();
    let a = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    a.set("mode", "a").await.unwrap();

    let b = build(&store, ServiceConfig::default(), "/svc2").await.unwrap();
    assert_eq!(b.with_record(|r| r.mode.clone()), "production");
    assert_eq!(a.get_typed::<String>("mode").await.unwrap(), "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_constructions_seed_exactly_once() {
    let (_, store) = memory_store();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store: Arc<dyn KvStore> = store.clone();
        handles.push(tokio::spawn(async move {
            build(&store, CounterConfig::default(), "/race").await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(config) => {
                assert_eq!(config.with_record(|r| r.counter), 0);
                successes += 1;
            }
            Err(e) => assert!(
                matches!(e, Error::Reconcile(ReconcileError::Conflict { .. })),
                "unexpected error: {e}"
            ),
        }
    }
    assert!(successes >= 1);

    let range = store.get_prefix("/race/").await.unwrap();
    assert_eq!(range.kvs.len(), 1);
    assert_eq!(range.kvs[0].key, "/race/counter");
    assert_eq!(range.kvs[0].value, b"0");
    assert_eq!(range.kvs[0].version, 1);
}

#[tokio::test]
async fn test_mistyped_stored_value_aborts_construction() {
    let (memory, store) = memory_store();
    store.put("/svc/timeout", b"[1, 2]".to_vec()).await.unwrap();

    let err = build(&store, ServiceConfig::default(), "/svc").await.unwrap_err();
    assert!(matches!(err, Error::Coercion(_)));
    assert_eq!(store.current_revision().await.unwrap(), 1);
    assert_eq!(memory.watcher_count(), 0);
}

#[tokio::test]
async fn test_schema_errors_abort_construction() {
    let (_, store) = memory_store();

    let err = build(&store, ClashingConfig::default(), "/svc").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Schema(SchemaError::DuplicateName { ref name, .. }) if name == "port"
    ));

    let err = build(&store, UnnamedConfig::default(), "/svc").await.unwrap_err();
    assert!(matches!(err, Error::Schema(SchemaError::MissingName { .. })));

    assert_eq!(store.current_revision().await.unwrap(), 0);
}
