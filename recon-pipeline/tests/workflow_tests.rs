//! End-to-end pipeline runs over CSV files and the memory store

mod helpers;

use helpers::{read_csv, test_pipeline, write_csv};
use recon_common::{Error, Identifier};
use recon_pipeline::models::{DeleteOutcome, MergeStrategy};
use recon_pipeline::services::remote_syncer::BATCH_FIELD;
use recon_pipeline::store::DocumentStore;
use recon_pipeline::workflow::{spawn_scheduled_purge, CleanRequest, RootSource};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_clean_blanks_ten_digit_phones_in_place() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "base.csv",
        &["cpf", "fone1", "fone2"],
        &[&["12.345.678/0001-99", "1234567890", "551234567890"]],
    );
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    let summary = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![path.clone()],
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.totals.cleaned_phone, 1);
    assert_eq!(summary.totals.total_retained, 1);
    assert!(summary.commit.is_none());

    let sheet = read_csv(&path);
    assert_eq!(sheet.get(0, 0), "12.345.678/0001-99");
    assert_eq!(sheet.get(0, 1), "");
    assert_eq!(sheet.get(0, 2), "551234567890");
}

#[tokio::test]
async fn test_clean_against_root_file_and_backup() {
    let dir = TempDir::new().unwrap();
    let root = write_csv(dir.path(), "raiz.csv", &["chave"], &[&["R1"], &["R2"]]);
    let path = write_csv(
        dir.path(),
        "base.csv",
        &["chave", "cpf"],
        &[&["R1", "1"], &[" R2 ", "2"], &["X", "3"], &["", "4"]],
    );
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    let summary = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![path.clone()],
                root: RootSource::File {
                    path: root,
                    column: None,
                },
                backup: true,
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.totals.removed_by_root, 2);
    assert_eq!(summary.totals.total_retained, 2);
    assert_eq!(read_csv(&path).row_count(), 2);

    let backups: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("base.backup_"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[tokio::test]
async fn test_missing_root_file_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "base.csv", &["cpf"], &[&["1"]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    let result = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![path.clone()],
                root: RootSource::File {
                    path: dir.path().join("nope.csv"),
                    column: None,
                },
                ..CleanRequest::default()
            },
        )
        .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    // The permit was released with the failed run
    assert!(!test.pipeline.is_busy());
}

#[tokio::test]
async fn test_persist_commit_then_delete_batch() {
    let dir = TempDir::new().unwrap();
    let a = write_csv(dir.path(), "a.csv", &["cpf"], &[&["1"], &["2"], &["1"]]);
    let b = write_csv(dir.path(), "b.csv", &["cpf"], &[&["2"], &["3"]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    let summary = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![a.clone(), b.clone()],
                persist: true,
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    let commit = summary.commit.expect("commit report");
    assert_eq!(commit.committed, 3);
    assert_eq!(test.pipeline.history_len().await, 3);
    assert_eq!(test.store.count("cnpjs_armazenados").await.unwrap(), 3);

    let doc = test.store.get("cnpjs_armazenados", "00000000000002").unwrap();
    assert_eq!(doc[BATCH_FIELD], json!(commit.batch_id));

    // Known identifiers are dropped by a later history-checked pass
    let permit = test.pipeline.try_begin("clean").unwrap();
    let again = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![b.clone()],
                check_history: true,
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(again.totals.duplicate, 2);
    assert_eq!(read_csv(&b).row_count(), 0);

    let outcome = test.pipeline.delete_batch(&commit.batch_id).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted { count: 3 });
    assert_eq!(test.pipeline.history_len().await, 0);
    assert_eq!(test.store.count("cnpjs_armazenados").await.unwrap(), 0);

    let missing = test.pipeline.delete_batch(&commit.batch_id).await.unwrap();
    assert_eq!(missing, DeleteOutcome::NotFound);
    assert!(matches!(
        test.pipeline.delete_batch("  ").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_commit_failure_is_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "a.csv", &["cpf"], &[&["1"]]);
    let test = test_pipeline();
    test.store.fail_upsert_calls(&[1]);

    let permit = test.pipeline.try_begin("clean").unwrap();
    let summary = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![path],
                persist: true,
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    assert!(summary.commit.is_none());
    assert!(summary.commit_error.is_some());
    assert_eq!(test.pipeline.history_len().await, 0);
}

#[tokio::test]
async fn test_bad_file_is_skipped_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let no_id = write_csv(dir.path(), "sem_id.csv", &["nome"], &[&["x"]]);
    let good = write_csv(dir.path(), "ok.csv", &["cpf"], &[&["1"]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    let summary = test
        .pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![no_id, dir.path().join("missing.csv"), good],
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(summary.files.len(), 3);
    assert!(summary.files[0].error.is_some());
    assert!(summary.files[1].error.is_some());
    assert!(summary.files[2].error.is_none());
    assert_eq!(summary.totals.total_retained, 1);
}

#[tokio::test]
async fn test_clean_by_history_persists_retained_identifiers() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "a.csv", &["CPF"], &[&["1"], &["2"]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean-history").unwrap();
    let first = test
        .pipeline
        .clean_by_history(permit, vec![path.clone()], true)
        .await
        .unwrap();
    assert_eq!(first.totals.total_retained, 2);
    assert_eq!(first.commit.map(|c| c.committed), Some(2));

    let permit = test.pipeline.try_begin("clean-history").unwrap();
    let second = test
        .pipeline
        .clean_by_history(permit, vec![path.clone()], false)
        .await
        .unwrap();
    assert_eq!(second.totals.duplicate, 2);
    assert_eq!(read_csv(&path).row_count(), 0);
}

#[tokio::test]
async fn test_history_mirror_loads_from_store() {
    let test = test_pipeline();
    let docs = vec![
        ("00000000000001".to_string(), json!({"numero": "00000000000001"}).as_object().unwrap().clone()),
        ("00000000000002".to_string(), json!({"numero": "00000000000002"}).as_object().unwrap().clone()),
    ];
    test.store.batch_upsert("cnpjs_armazenados", &docs, false).await.unwrap();

    assert_eq!(test.pipeline.load_history().await, 2);
    let stats = test.pipeline.stats().await.unwrap();
    assert_eq!(stats.history_mirror, 2);
    assert_eq!(stats.history_collection, 2);
    assert!(!stats.run_active);
}

#[tokio::test]
async fn test_unreadable_store_leaves_mirror_empty() {
    let test = test_pipeline();
    test.store.fail_scans(true);
    assert_eq!(test.pipeline.load_history().await, 0);
}

#[tokio::test]
async fn test_single_run_at_a_time() {
    let test = test_pipeline();
    let permit = test.pipeline.try_begin("clean").unwrap();
    assert!(test.pipeline.is_busy());
    assert!(matches!(test.pipeline.try_begin("enrich"), Err(Error::Conflict(_))));

    drop(permit);
    assert!(test.pipeline.try_begin("enrich").is_ok());
}

#[tokio::test]
async fn test_load_then_enrich_append() {
    let dir = TempDir::new().unwrap();
    let master = write_csv(
        dir.path(),
        "mestre.csv",
        &["cnpj", "telefone1", "celular"],
        &[
            &["12.345.678/0001-99", "(11) 5555-1111", "11999998888"],
            &["98765432100", "123", ""],
        ],
    );
    let work = write_csv(
        dir.path(),
        "trabalho.csv",
        &["cpf", "fone1", "fone2"],
        &[&["12345678000199", "", "551199998888"], &["11111111111", "", ""], &["", "", ""]],
    );
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("enrichment-load").unwrap();
    let load = test
        .pipeline
        .load_enrichment(permit, vec![master])
        .await
        .unwrap();
    assert_eq!(load.files_processed, 1);
    // The second identifier has no phone with at least 8 digits
    assert_eq!(load.identifiers_written, 1);

    let permit = test.pipeline.try_begin("enrich").unwrap();
    let summary = test
        .pipeline
        .enrich(permit, vec![work.clone()], MergeStrategy::Append, false)
        .await
        .unwrap();
    assert_eq!(summary.enriched, 1);
    assert_eq!(summary.not_found, 1);

    let sheet = read_csv(&work);
    let status = sheet.header("status").unwrap();
    assert_eq!(sheet.get(0, 1), "(11) 5555-1111");
    assert_eq!(sheet.get(0, 2), "551199998888");
    assert_eq!(sheet.get(0, status), "Enriquecido");
    assert_eq!(sheet.get(1, status), "Pobre");
    // Rows without an identifier get no status
    assert_eq!(sheet.get(2, status), "");
}

#[tokio::test]
async fn test_feed_root_skips_present_keys() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "raiz.csv",
        &["cnpj"],
        &[&["12.345.678/0001-99"], &["123.456.789-01"], &["123"]],
    );
    let test = test_pipeline();
    let existing = vec![("12345678901".to_string(), serde_json::Map::new())];
    test.store.batch_upsert("Raiz", &existing, false).await.unwrap();

    let permit = test.pipeline.try_begin("feed-root").unwrap();
    let summary = test.pipeline.feed_root(permit, vec![path]).await.unwrap();

    assert_eq!(summary.checked, 2);
    assert_eq!(summary.already_present, 1);
    assert_eq!(summary.written, 1);
    let doc = test.store.get("Raiz", "12345678000199").unwrap();
    assert_eq!(doc["fonte"], json!("raiz.csv"));
}

#[tokio::test]
async fn test_phone_maintenance_operations() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        dir.path(),
        "base.csv",
        &["cpf", "fone1", "fone2", "fone3"],
        &[&["1", "", "a", "b"]],
    );
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("adjust-phones").unwrap();
    assert_eq!(test.pipeline.adjust_phones(permit, path.clone(), false).await.unwrap(), 1);
    let sheet = read_csv(&path);
    assert_eq!(sheet.get(0, 1), "a");
    assert_eq!(sheet.get(0, 2), "b");
    assert_eq!(sheet.get(0, 3), "");

    let permit = test.pipeline.try_begin("prepare-phone-headers").unwrap();
    let prepared = test
        .pipeline
        .prepare_phone_headers(permit, vec![path.clone()])
        .await
        .unwrap();
    assert_eq!(prepared, vec![(path.clone(), 11)]);
    let headers = read_csv(&path).headers().to_vec();
    assert_eq!(headers.len(), 15);
    assert_eq!(headers.last().map(String::as_str), Some("fone14"));

    let no_phones = write_csv(dir.path(), "sem.csv", &["cpf"], &[&["1"]]);
    let permit = test.pipeline.try_begin("adjust-phones").unwrap();
    assert!(matches!(
        test.pipeline.adjust_phones(permit, no_phones, false).await,
        Err(Error::ColumnNotFound(_))
    ));
}

#[tokio::test]
async fn test_merge_keeps_first_header() {
    let dir = TempDir::new().unwrap();
    let a = write_csv(dir.path(), "a.csv", &["cpf", "nome"], &[&["1", "x"]]);
    let b = write_csv(dir.path(), "b.csv", &["CPF", "NOME"], &[&["2", "y"], &["3", "z"]]);
    let dest = dir.path().join("merged.csv");
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("merge").unwrap();
    let rows = test
        .pipeline
        .merge_files(permit, vec![a.clone(), b], dest.clone())
        .await
        .unwrap();

    assert_eq!(rows, 3);
    let merged = read_csv(&dest);
    assert_eq!(merged.headers(), &["cpf".to_string(), "nome".to_string()]);
    assert_eq!(merged.get(2, 0), "3");

    let permit = test.pipeline.try_begin("merge").unwrap();
    assert!(matches!(
        test.pipeline.merge_files(permit, vec![a], dest).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_exports() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(dir.path(), "a.csv", &["cpf"], &[&["2"], &["1"]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("clean").unwrap();
    test.pipeline
        .clean(
            permit,
            CleanRequest {
                files: vec![path],
                persist: true,
                ..CleanRequest::default()
            },
        )
        .await
        .unwrap();

    let history_dest = dir.path().join("historico.csv");
    assert_eq!(test.pipeline.export_history(&history_dest).await.unwrap(), 2);
    let history = read_csv(&history_dest);
    assert_eq!(history.get(0, 0), Identifier::normalize("1").as_str());

    let enrichment_dest = dir.path().join("enriquecidos.csv");
    assert_eq!(test.pipeline.export_enrichment(&enrichment_dest).await.unwrap(), 0);
    assert_eq!(read_csv(&enrichment_dest).headers().len(), 15);
}

#[tokio::test]
async fn test_purge_history_empties_collection_and_mirror() {
    let test = test_pipeline();
    let docs: Vec<_> = (1..=5)
        .map(|i| {
            let key = format!("{:014}", i);
            (key.clone(), json!({ "numero": key }).as_object().unwrap().clone())
        })
        .collect();
    test.store.batch_upsert("cnpjs_armazenados", &docs, false).await.unwrap();
    test.store
        .batch_upsert("Raiz", &docs[..1], false)
        .await
        .unwrap();
    assert_eq!(test.pipeline.load_history().await, 5);

    let permit = test.pipeline.try_begin("purge-history").unwrap();
    let summary = test.pipeline.purge_history(permit).await.unwrap();

    assert_eq!(summary.deleted, 5);
    assert_eq!(summary.mirror_cleared, 5);
    assert_eq!(test.pipeline.history_len().await, 0);
    assert_eq!(test.store.count("cnpjs_armazenados").await.unwrap(), 0);
    assert_eq!(test.store.count("Raiz").await.unwrap(), 1);

    // Purging an empty collection succeeds
    let permit = test.pipeline.try_begin("purge-history").unwrap();
    assert_eq!(test.pipeline.purge_history(permit).await.unwrap().deleted, 0);
}

#[tokio::test]
async fn test_update_blocklist_merges_into_root_file() {
    let dir = TempDir::new().unwrap();
    let root = write_csv(dir.path(), "raiz_att.csv", &["cpf"], &[&["111"], &["222"]]);
    let blocklist = write_csv(dir.path(), "Blocklist.csv", &["333"], &[&["222"], &["444", ""]]);
    let test = test_pipeline();

    let permit = test.pipeline.try_begin("update-blocklist").unwrap();
    let summary = test
        .pipeline
        .update_blocklist(permit, blocklist.clone(), root.clone(), true)
        .await
        .unwrap();

    assert_eq!(summary.blocklist_values, 3);
    assert_eq!(summary.added, 2);
    assert_eq!(summary.total, 5);

    let merged = read_csv(&root);
    assert_eq!(merged.headers(), &["cpf".to_string()]);
    let values: Vec<&str> = (0..merged.row_count()).map(|r| merged.get(r, 0)).collect();
    assert_eq!(values, vec!["111", "222", "333", "444"]);

    let backup = summary.backup.expect("backup path");
    assert_eq!(read_csv(&backup).row_count(), 2);

    // Running again adds nothing
    let permit = test.pipeline.try_begin("update-blocklist").unwrap();
    let again = test
        .pipeline
        .update_blocklist(permit, blocklist, root.clone(), false)
        .await
        .unwrap();
    assert_eq!(again.added, 0);
    assert!(again.backup.is_none());

    let permit = test.pipeline.try_begin("update-blocklist").unwrap();
    assert!(matches!(
        test.pipeline
            .update_blocklist(permit, dir.path().join("missing.csv"), root, false)
            .await,
        Err(Error::FileIo(_))
    ));
}

#[tokio::test]
async fn test_scheduled_purge_runs_on_interval() {
    let test = test_pipeline();
    let docs = vec![("00000000000001".to_string(), json!({}).as_object().unwrap().clone())];
    test.store.batch_upsert("cnpjs_armazenados", &docs, false).await.unwrap();
    test.pipeline.load_history().await;

    let schedule = spawn_scheduled_purge(test.pipeline.clone(), Duration::from_millis(20));
    let purged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if test.store.count("cnpjs_armazenados").await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    schedule.abort();

    assert!(purged.is_ok(), "history was not purged");
    assert_eq!(test.pipeline.history_len().await, 0);
}
