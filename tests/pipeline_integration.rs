//! Pipeline integration tests: ordering, conversion, merge, storage, and
//! failure semantics, all against a stub engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bindery::models::{JobStage, JobStatus};
use bindery::services::{ConversionEngine, Preview};
use bindery::{db, Error};

use common::{make_zip, StubEngine, TestHarness};

const DOCX: &[u8] = b"not a real docx, the stub engine does not care";

async fn register_user(harness: &TestHarness, name: &str) -> String {
    db::register(&harness.state.db, name, "pass123")
        .await
        .unwrap()
        .id
}

/// Poll until the job reaches a terminal stage.
async fn wait_for_done(harness: &TestHarness, job_id: &str, user_id: &str) -> bindery::models::JobProgress {
    for _ in 0..200 {
        let progress = harness.state.pipeline.status(job_id, user_id).await.unwrap();
        if progress.done {
            return progress;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} did not finish", job_id);
}

async fn prepare_zip(harness: &TestHarness, user_id: &str, names: &[&str]) -> Preview {
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, DOCX)).collect();
    harness
        .state
        .pipeline
        .prepare_archive(user_id, make_zip(&entries), "report.zip")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_preview_orders_by_page_marker() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(
        &harness,
        &user_id,
        &["стр. 5-6.docx", "Заключение.docx", "Титул.docx", "стр. 2-4.docx"],
    )
    .await;

    let names: Vec<&str> = preview.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Титул.docx", "стр. 2-4.docx", "стр. 5-6.docx", "Заключение.docx"]
    );
    assert_eq!(preview.files[0].page, 1);
    assert_eq!(preview.files[1].page, 2);
    assert_eq!(preview.files[3].page, 0);
    assert_eq!(preview.stage, JobStage::Preview);
}

#[tokio::test]
async fn test_unsupported_only_archive_is_rejected() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let archive = make_zip(&[("readme.txt", DOCX), ("image.png", DOCX)]);
    let err = harness
        .state
        .pipeline
        .prepare_archive(&user_id, archive, "stuff.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_garbage_archive_is_rejected() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let err = harness
        .state
        .pipeline
        .prepare_archive(&user_id, b"definitely not a zip".to_vec(), "x.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(&harness, &user_id, &["стр. 2.docx", "Титул.docx"]).await;
    let order: Vec<usize> = preview.files.iter().map(|f| f.index).collect();

    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &order)
        .await
        .unwrap();

    let progress = wait_for_done(&harness, &preview.job_id, &user_id).await;
    assert_eq!(progress.stage, JobStage::Done);
    assert_eq!(progress.total_pages, Some(2));
    assert!(progress.failed.is_empty());
    assert_eq!(progress.filename.as_deref(), Some("report.pdf"));

    // Artifact is in the user's partition under exactly the reported name
    let listed = harness.state.store.list(&user_id).await.unwrap();
    assert_eq!(listed, vec!["report.pdf"]);
    let bytes = harness.state.store.get(&user_id, "report.pdf").await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    // The persistent record matches
    let record = db::get_job(&harness.state.db, &preview.job_id).await.unwrap();
    assert_eq!(record.get_status(), Some(JobStatus::Completed));
    assert_eq!(record.total_pages, Some(2));
}

#[tokio::test]
async fn test_user_order_is_respected() {
    let engine = Arc::new(StubEngine::new());
    let harness = TestHarness::with_engine(engine.clone()).await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(&harness, &user_id, &["Титул.docx", "стр. 2.docx"]).await;
    // Preview order is [Титул, стр. 2]; reverse it
    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &[1, 0])
        .await
        .unwrap();
    wait_for_done(&harness, &preview.job_id, &user_id).await;

    assert_eq!(
        engine.converted_names(),
        vec!["стр. 2.docx".to_string(), "Титул.docx".to_string()]
    );
}

#[tokio::test]
async fn test_partial_failure_still_completes() {
    let engine: Arc<dyn ConversionEngine> = Arc::new(StubEngine::failing_on("bad"));
    let harness = TestHarness::with_engine(engine).await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(
        &harness,
        &user_id,
        &["стр. 2.docx", "bad стр. 3.docx", "стр. 4.docx"],
    )
    .await;
    let order: Vec<usize> = preview.files.iter().map(|f| f.index).collect();
    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &order)
        .await
        .unwrap();

    let progress = wait_for_done(&harness, &preview.job_id, &user_id).await;
    assert_eq!(progress.stage, JobStage::Done);
    assert_eq!(progress.total_pages, Some(2));
    assert_eq!(progress.failed, vec!["bad стр. 3.docx".to_string()]);
}

#[tokio::test]
async fn test_all_failures_fail_the_job() {
    let engine: Arc<dyn ConversionEngine> = Arc::new(StubEngine::failing_on(".docx"));
    let harness = TestHarness::with_engine(engine).await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(&harness, &user_id, &["a.docx", "b.docx"]).await;
    let order: Vec<usize> = preview.files.iter().map(|f| f.index).collect();
    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &order)
        .await
        .unwrap();

    let progress = wait_for_done(&harness, &preview.job_id, &user_id).await;
    assert_eq!(progress.stage, JobStage::Error);
    assert!(progress.error.as_deref().unwrap_or("").contains("a.docx"));

    let record = db::get_job(&harness.state.db, &preview.job_id).await.unwrap();
    assert_eq!(record.get_status(), Some(JobStatus::Failed));

    // Nothing landed in the user's partition
    assert!(harness.state.store.list(&user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(&harness, &user_id, &["a.docx"]).await;
    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &[0])
        .await
        .unwrap();

    let err = harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &[0])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_other_users_job_is_off_limits() {
    let harness = TestHarness::new().await;
    let owner = register_user(&harness, "ivan").await;
    let intruder = register_user(&harness, "boris").await;

    let preview = prepare_zip(&harness, &owner, &["a.docx"]).await;

    let err = harness
        .state
        .pipeline
        .start(&preview.job_id, &intruder, &[0])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden));

    let err = harness
        .state
        .pipeline
        .status(&preview.job_id, &intruder)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden));
}

#[tokio::test]
async fn test_name_collision_gets_prefixed() {
    let harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    for _ in 0..2 {
        let preview = prepare_zip(&harness, &user_id, &["a.docx"]).await;
        harness
            .state
            .pipeline
            .start(&preview.job_id, &user_id, &[0])
            .await
            .unwrap();
        wait_for_done(&harness, &preview.job_id, &user_id).await;
    }

    let listed = harness.state.store.list(&user_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&"report.pdf".to_string()));
    assert!(listed.iter().any(|n| n.ends_with("_report.pdf")));
}

#[tokio::test]
async fn test_completed_job_survives_restart() {
    let mut harness = TestHarness::new().await;
    let user_id = register_user(&harness, "ivan").await;

    let preview = prepare_zip(&harness, &user_id, &["a.docx"]).await;
    harness
        .state
        .pipeline
        .start(&preview.job_id, &user_id, &[0])
        .await
        .unwrap();
    wait_for_done(&harness, &preview.job_id, &user_id).await;

    harness.restart().await;

    // Status now comes from the persistent record
    let progress = harness
        .state
        .pipeline
        .status(&preview.job_id, &user_id)
        .await
        .unwrap();
    assert_eq!(progress.stage, JobStage::Done);
    assert_eq!(progress.filename.as_deref(), Some("report.pdf"));

    // And the artifact is still downloadable
    let (path, filename) = harness
        .state
        .pipeline
        .artifact_for_download(&preview.job_id, &user_id)
        .await
        .unwrap();
    assert_eq!(filename, "report.pdf");
    assert!(path.exists());
}
