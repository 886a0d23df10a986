use std::collections::BTreeMap;
use std::time::Duration;

use d_config::KvStore;
use d_config::RealtimeConfig;
use tokio_util::sync::CancellationToken;

use crate::common::build;
use crate::common::memory_store;
use crate::common::wait_until;
use crate::common::ComplexConfig;
use crate::common::ServiceConfig;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_external_writes_converge_including_containers() {
    let (_, store) = memory_store();
    let config = build(&store, ComplexConfig::default(), "/svc").await.unwrap();

    store
        .put("/svc/limits", br#"{"read": 100, "write": 10}"#.to_vec())
        .await
        .unwrap();
    store
        .put("/svc/hosts", br#"["db-1", "db-2"]"#.to_vec())
        .await
        .unwrap();
    store.put("/svc/weights", b"[1, 2, 3]".to_vec()).await.unwrap();
    store
        .put("/svc/features", br#"{"tracing": {}}"#.to_vec())
        .await
        .unwrap();
    store.put("/svc/poll_interval", br#""1.5s""#.to_vec()).await.unwrap();

    let expected = Duration::from_millis(1500);
    assert!(wait_until(WAIT, || config.with_record(|r| r.poll_interval == expected)).await);

    let record = config.snapshot();
    assert_eq!(
        record.limits,
        BTreeMap::from([("read".to_string(), 100), ("write".to_string(), 10)])
    );
    assert_eq!(record.hosts, vec!["db-1", "db-2"]);
    assert_eq!(record.weights, [1, 2, 3]);
    assert!(record.features.contains("tracing"));
}

#[tokio::test]
async fn test_bad_events_do_not_stop_the_watcher() {
    let (_, store) = memory_store();
    let config = build(&store, ComplexConfig::default(), "/svc").await.unwrap();

    // Wrong length, wrong type, not JSON
    store.put("/svc/weights", b"[1, 2]".to_vec()).await.unwrap();
    store.put("/svc/hosts", b"42".to_vec()).await.unwrap();
    store.put("/svc/limits", b"{".to_vec()).await.unwrap();
    store.put("/svc/weights", b"[7, 8, 9]".to_vec()).await.unwrap();

    assert!(wait_until(WAIT, || config.with_record(|r| r.weights == [7, 8, 9])).await);
    assert!(config.is_watching());
    assert!(config.with_record(|r| r.hosts.is_empty() && r.limits.is_empty()));
}

#[tokio::test]
async fn test_clients_on_one_prefix_converge() {
    let (_, store) = memory_store();
    let a = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    let b = build(&store, ServiceConfig::default(), "/svc").await.unwrap();

    a.set("timeout", 11).await.unwrap();
    b.set("mode", "canary").await.unwrap();
    a.set("timeout", 12).await.unwrap();

    let expected = ServiceConfig {
        timeout: 12,
        mode: "canary".to_string(),
    };
    assert!(wait_until(WAIT, || a.snapshot() == expected).await);
    assert!(wait_until(WAIT, || b.snapshot() == expected).await);
}

#[tokio::test]
async fn test_deleted_key_keeps_last_value() {
    let (_, store) = memory_store();
    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    config.set("timeout", 5).await.unwrap();

    store.delete("/svc/timeout").await.unwrap();
    store.put("/svc/mode", br#""after-delete""#.to_vec()).await.unwrap();

    assert!(wait_until(WAIT, || config.with_record(|r| r.mode == "after-delete")).await);
    assert_eq!(config.with_record(|r| r.timeout), 5);
}

#[tokio::test]
async fn test_cancelling_parent_token_stops_watching() {
    let (memory, store) = memory_store();
    let parent = CancellationToken::new();
    let config = RealtimeConfig::builder(store.clone(), ServiceConfig::default())
        .prefix("/svc")
        .cancellation_token(parent.clone())
        .build()
        .await
        .unwrap();

    parent.cancel();
    assert!(wait_until(WAIT, || !config.is_watching()).await);
    assert!(wait_until(WAIT, || memory.watcher_count() == 0).await);

    // Local writes still go through
    config.set("timeout", 77).await.unwrap();
    assert_eq!(config.with_record(|r| r.timeout), 77);
    assert_eq!(config.get_typed::<i64>("timeout").await.unwrap(), 77);
}

#[tokio::test]
async fn test_disabled_watch_never_subscribes() {
    let (memory, store) = memory_store();
    let mut settings = d_config::ConfigSettings::default();
    settings.watch.enabled = false;

    let config = RealtimeConfig::builder(store.clone(), ServiceConfig::default())
        .prefix("/svc")
        .settings(settings)
        .build()
        .await
        .unwrap();
    assert_eq!(memory.watcher_count(), 0);

    store.put("/svc/timeout", b"99".to_vec()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(config.with_record(|r| r.timeout), 30);
}
