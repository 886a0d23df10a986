use d_config::Error;
use d_config::FieldValue;
use d_config::HistoryError;
use d_config::KvStore;

use crate::common::build;
use crate::common::memory_store;
use crate::common::ServiceConfig;

#[tokio::test]
async fn test_rollback_by_revision_restores_first_value() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();

    config.set("mode", "v1").await.unwrap();
    let v1_revision = store.current_revision().await.unwrap();
    config.set("mode", "v2").await.unwrap();

    let history = config.get_key_history("mode", 0, 0).await.unwrap();
    let reported = history
        .iter()
        .find(|e| e.mod_revision == v1_revision)
        .map(|e| e.value.clone())
        .unwrap();
    assert_eq!(reported, FieldValue::String("v1".into()));

    config.rollback_key_by_revision("mode", v1_revision).await.unwrap();

    assert_eq!(config.with_record(|r| r.mode.clone()), "v1");
    assert_eq!(config.get("mode").await.unwrap(), reported);

    // Rollback is a new write, not a rewind
    let kv = store.get("/svc/mode").await.unwrap().unwrap();
    assert_eq!(kv.version, 4);
    assert_eq!(kv.mod_revision, v1_revision + 2);
}

#[tokio::test]
async fn test_history_reflects_every_write() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    for timeout in [10, 20, 30] {
        config.set("timeout", timeout).await.unwrap();
    }

    let history = config.get_key_history("timeout", 0, 0).await.unwrap();
    let values: Vec<_> = history.iter().map(|e| e.value.as_i64().unwrap()).collect();
    assert_eq!(values, vec![30, 20, 10, 30]);
    let versions: Vec<_> = history.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![4, 3, 2, 1]);

    // Restoring an entry from history reproduces its value
    let oldest = history.last().unwrap();
    config
        .rollback_key_by_version("timeout", oldest.version)
        .await
        .unwrap();
    assert_eq!(config.get("timeout").await.unwrap(), oldest.value);
}

#[tokio::test]
async fn test_rollback_config_walks_back_one_change_per_call() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();

    config.set("timeout", 30).await.unwrap();
    config.set("mode", "dev").await.unwrap();
    let initial = store.current_revision().await.unwrap();

    config.set("timeout", 60).await.unwrap();
    config.set("mode", "prod").await.unwrap();

    config.rollback_config(initial - 1).await.unwrap();
    config.rollback_config(initial).await.unwrap();

    assert_eq!(
        config.snapshot(),
        ServiceConfig {
            timeout: 30,
            mode: "dev".to_string()
        }
    );

    let err = config.rollback_config(999_999).await.unwrap_err();
    assert!(matches!(err, Error::History(HistoryError::RevisionNotFound { .. })));
}

#[tokio::test]
async fn test_rollback_record_restores_a_whole_revision() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    let seeded = store.current_revision().await.unwrap();

    config.set("timeout", 1).await.unwrap();
    config.set("mode", "maintenance").await.unwrap();

    assert_eq!(config.rollback_record(seeded).await.unwrap(), 2);
    assert_eq!(config.snapshot(), ServiceConfig::default());
}
