use futures::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;

use super::*;
use crate::Error;
use crate::StorageSettings;
use crate::StoreError;

#[tokio::test]
async fn put_and_get_should_track_revisions() {
    let store = SledKvStore::temporary().unwrap();

    assert_eq!(store.put("/c/a", b"1".to_vec()).await.unwrap(), 1);
    assert_eq!(store.put("/c/a", b"2".to_vec()).await.unwrap(), 2);

    let kv = store.get("/c/a").await.unwrap().unwrap();
    assert_eq!(kv.value, b"2");
    assert_eq!(kv.create_revision, 1);
    assert_eq!(kv.version, 2);
    assert_eq!(store.current_revision().await.unwrap(), 2);
}

#[tokio::test]
async fn get_at_revision_should_not_leak_across_similar_keys() {
    let store = SledKvStore::temporary().unwrap();
    store.put("a", b"1".to_vec()).await.unwrap();
    store.put("ab", b"2".to_vec()).await.unwrap();
    store.delete("a").await.unwrap();

    assert_eq!(store.get_at_revision("a", 2).await.unwrap().unwrap().value, b"1");
    assert!(store.get_at_revision("a", 3).await.unwrap().is_none());
    assert!(store.get_at_revision("ab", 1).await.unwrap().is_none());
    assert!(matches!(
        store.get_at_revision("a", 9).await,
        Err(Error::Store(StoreError::FutureRevision { .. }))
    ));
}

#[tokio::test]
async fn txn_should_honor_compares() {
    let store = SledKvStore::temporary().unwrap();
    store.put("/p/x", b"1".to_vec()).await.unwrap();

    let rejected = store
        .txn(Txn::new().when(Compare::Absent("/p/x".into())).put("/p/x", b"2".to_vec()))
        .await
        .unwrap();
    assert!(!rejected.succeeded);

    let accepted = store
        .txn(
            Txn::new()
                .when(Compare::ModRevision {
                    key: "/p/x".into(),
                    revision: 1,
                })
                .delete("/p/x")
                .put("/p/y", b"3".to_vec()),
        )
        .await
        .unwrap();
    assert!(accepted.succeeded);
    assert_eq!(accepted.revision, 2);

    let resp = store.get_prefix("/p/").await.unwrap();
    assert_eq!(resp.kvs.len(), 1);
    assert_eq!(resp.kvs[0].key, "/p/y");
    assert_eq!(resp.revision, 2);
}

#[tokio::test]
async fn keys_with_nul_should_be_rejected() {
    let store = SledKvStore::temporary().unwrap();

    assert!(store.put("bad\0key", b"1".to_vec()).await.is_err());
    assert_eq!(store.current_revision().await.unwrap(), 0);
}

#[tokio::test]
async fn watch_should_replay_history_and_deliver_live_events() {
    let store = SledKvStore::temporary().unwrap();
    store.put("/w/a", b"1".to_vec()).await.unwrap();

    let mut stream = store.watch("/w/", 1).await.unwrap();
    store.delete_prefix("/w/").await.unwrap();

    let first = timeout(Duration::from_millis(200), stream.next()).await.unwrap().unwrap();
    let second = timeout(Duration::from_millis(200), stream.next()).await.unwrap().unwrap();
    assert_eq!(first.kind, EventKind::Put);
    assert_eq!(second.kind, EventKind::Delete);
    assert_eq!(second.kv.mod_revision, 2);

    store.close_watchers();
    assert!(timeout(Duration::from_millis(200), stream.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn reopen_should_restore_state() {
    let temp_dir = tempfile::tempdir().unwrap();
    let settings = StorageSettings {
        db_path: temp_dir.path().join("db"),
        flush_every_ms: 10,
    };

    {
        let store = SledKvStore::open_with(&settings).unwrap();
        store.put("/c/timeout", b"30".to_vec()).await.unwrap();
        store.put("/c/timeout", b"60".to_vec()).await.unwrap();
        store.flush().unwrap();
    }

    let store = SledKvStore::open(&settings.db_path).unwrap();
    assert_eq!(store.current_revision().await.unwrap(), 2);
    assert_eq!(store.get("/c/timeout").await.unwrap().unwrap().version, 2);
    assert_eq!(store.get_at_revision("/c/timeout", 1).await.unwrap().unwrap().value, b"30");
}
