//! SQLite document store against a temporary database file

use recon_common::Error;
use recon_pipeline::store::{Document, DocumentStore, SqliteStore, StoreLimits};
use serde_json::json;
use tempfile::TempDir;

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

async fn open_store(dir: &TempDir) -> SqliteStore {
    let limits = StoreLimits {
        max_batch_writes: 3,
        max_in_keys: 2,
    };
    SqliteStore::open(&dir.path().join("data").join("recon.db"), limits)
        .await
        .expect("Failed to open store")
}

#[tokio::test]
async fn test_upsert_merge_keeps_existing_fields() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .batch_upsert("enriq", &[("1".into(), doc(json!({"telefones": ["a"], "fonte_dados": "x.csv"})))], true)
        .await
        .unwrap();
    store
        .batch_upsert("enriq", &[("1".into(), doc(json!({"telefones": ["b"], "extra": 1})))], true)
        .await
        .unwrap();

    let found = store.query_in("enriq", &["1".to_string()]).await.unwrap();
    assert_eq!(found.len(), 1);
    let body = &found[0].1;
    assert_eq!(body["telefones"], json!(["b"]));
    assert_eq!(body["fonte_dados"], json!("x.csv"));
    assert_eq!(body["extra"], json!(1));
}

#[tokio::test]
async fn test_upsert_without_merge_replaces_body() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .batch_upsert("h", &[("1".into(), doc(json!({"a": 1})))], false)
        .await
        .unwrap();
    store
        .batch_upsert("h", &[("1".into(), doc(json!({"b": 2})))], false)
        .await
        .unwrap();

    let found = store.query_in("h", &["1".to_string()]).await.unwrap();
    assert!(found[0].1.get("a").is_none());
    assert_eq!(found[0].1["b"], json!(2));
}

#[tokio::test]
async fn test_limits_are_enforced() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let docs: Vec<(String, Document)> = (0..4).map(|i| (i.to_string(), Document::new())).collect();
    assert!(matches!(
        store.batch_upsert("h", &docs, false).await,
        Err(Error::InvalidInput(_))
    ));

    let keys: Vec<String> = (0..3).map(|i| i.to_string()).collect();
    assert!(matches!(store.query_in("h", &keys).await, Err(Error::InvalidInput(_))));
    assert_eq!(store.count("h").await.unwrap(), 0);
}

#[tokio::test]
async fn test_query_eq_and_delete_by_batch() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .batch_upsert(
            "h",
            &[
                ("1".into(), doc(json!({"batchId": "b1"}))),
                ("2".into(), doc(json!({"batchId": "b2"}))),
                ("3".into(), doc(json!({"batchId": "b1"}))),
            ],
            false,
        )
        .await
        .unwrap();

    let tagged = store.query_eq("h", "batchId", "b1").await.unwrap();
    let keys: Vec<String> = tagged.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["1", "3"]);

    store.batch_delete("h", &keys).await.unwrap();
    assert_eq!(store.count("h").await.unwrap(), 1);
    assert!(store.query_eq("h", "batchId", "b1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scan_pages_in_key_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    for keys in [["c", "a", "e"], ["b", "d", "f"]] {
        let docs: Vec<(String, Document)> = keys.iter().map(|k| (k.to_string(), Document::new())).collect();
        store.batch_upsert("raiz", &docs, false).await.unwrap();
    }
    store
        .batch_upsert("other", &[("0".into(), Document::new())], false)
        .await
        .unwrap();

    let first = store.scan_page("raiz", None, 4).await.unwrap();
    let first_keys: Vec<&str> = first.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(first_keys, vec!["a", "b", "c", "d"]);

    let rest = store.scan_page("raiz", Some("d"), 4).await.unwrap();
    let rest_keys: Vec<&str> = rest.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(rest_keys, vec!["e", "f"]);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        store
            .batch_upsert("h", &[("00000000000001".into(), doc(json!({"numero": "00000000000001"})))], false)
            .await
            .unwrap();
        store.pool().close().await;
    }

    let reopened = open_store(&dir).await;
    assert_eq!(reopened.count("h").await.unwrap(), 1);
}
