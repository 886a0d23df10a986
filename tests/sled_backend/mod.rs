use std::sync::Arc;
use std::time::Duration;

use d_config::KvStore;
use d_config::SledKvStore;
use d_config::StorageSettings;

use crate::common::build;
use crate::common::wait_until;
use crate::common::ServiceConfig;

fn sled_store(dir: &tempfile::TempDir) -> (Arc<SledKvStore>, Arc<dyn KvStore>) {
    let settings = StorageSettings {
        db_path: dir.path().join("d-config"),
        ..Default::default()
    };
    let store = Arc::new(SledKvStore::open_with(&settings).unwrap());
    let dyn_store: Arc<dyn KvStore> = store.clone();
    (store, dyn_store)
}

#[tokio::test]
async fn test_sled_backed_client_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (sled, store) = sled_store(&dir);

    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    config.set("timeout", 120).await.unwrap();
    assert_eq!(config.get_typed::<i64>("timeout").await.unwrap(), 120);

    store.put("/svc/mode", br#""sled""#.to_vec()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || config.with_record(|r| r.mode == "sled")).await);

    config.shutdown().await.unwrap();
    drop(config);
    sled.flush().unwrap();

    // A later client on the same store loads what was written
    let reloaded = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    assert_eq!(
        reloaded.snapshot(),
        ServiceConfig {
            timeout: 120,
            mode: "sled".to_string()
        }
    );
}

#[tokio::test]
async fn test_sled_backed_history_and_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let (_, store) = sled_store(&dir);

    let config = build(&store, ServiceConfig::default(), "/svc").await.unwrap();
    config.set("mode", "blue").await.unwrap();
    let blue = store.current_revision().await.unwrap();
    config.set("mode", "green").await.unwrap();

    let history = config.get_key_history("mode", 0, 0).await.unwrap();
    let modes: Vec<_> = history.iter().map(|e| e.value.as_str().unwrap().to_string()).collect();
    assert_eq!(modes, vec!["green", "blue", "production"]);

    config.rollback_key_by_revision("mode", blue).await.unwrap();
    assert_eq!(config.with_record(|r| r.mode.clone()), "blue");
}
