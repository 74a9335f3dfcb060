mod common;

use anyhow::Result;
use axum::http::StatusCode;
use cloudvault::files::journal::{self, ReconcileReport, KIND_DELETE, KIND_RENAME, KIND_UPLOAD};
use cloudvault::schema::pending_operations;
use common::{body_to_vec, TestApp};
use diesel::prelude::*;

async fn record(
    app: &TestApp,
    kind: &'static str,
    owner_id: i32,
    file_id: Option<i32>,
    source: String,
    target: Option<String>,
) -> Result<i32> {
    app.with_conn(move |conn| {
        Ok(journal::record(
            conn,
            kind,
            owner_id,
            file_id,
            &source,
            target.as_deref(),
        )?)
    })
    .await
}

async fn pending_count(app: &TestApp) -> Result<i64> {
    app.with_conn(|conn| Ok(pending_operations::table.count().get_result(conn)?))
        .await
}

#[tokio::test]
async fn rolls_forward_interrupted_upload() -> Result<()> {
    let app = TestApp::new().await?;
    let session = app.login("owner@example.com", "pw").await?;
    let owner = session.user_id;

    app.upload_files(&[("x.txt", b"old")], None, &session).await?;
    let file_id = app.list("", &session).await?[0].2;

    let staging = app.uploads_dir().join(".staging");
    std::fs::create_dir_all(&staging)?;
    std::fs::write(staging.join("pending-upload"), b"new")?;
    record(
        &app,
        KIND_UPLOAD,
        owner,
        file_id,
        ".staging/pending-upload".to_string(),
        Some(format!("{owner}/x.txt")),
    )
    .await?;
    record(
        &app,
        KIND_UPLOAD,
        owner,
        None,
        ".staging/never-written".to_string(),
        Some(format!("{owner}/y.txt")),
    )
    .await?;

    let report = journal::reconcile_pending(&app.state).await?;
    assert_eq!(
        report,
        ReconcileReport {
            completed: 1,
            discarded: 1,
            failed: 0
        }
    );
    assert_eq!(pending_count(&app).await?, 0);

    let response = app.get("/api/files/x.txt/download", Some(&session)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_vec(response.into_body()).await?, b"new");
    assert!(!staging.join("pending-upload").exists());
    Ok(())
}

#[tokio::test]
async fn rolls_forward_interrupted_rename() -> Result<()> {
    let app = TestApp::new().await?;
    let session = app.login("owner@example.com", "pw").await?;
    let owner = session.user_id;

    app.upload_files(&[("a.txt", b"a")], Some("docs"), &session)
        .await?;
    let file_id = app.list("docs", &session).await?[0].2;

    let folder = app.uploads_dir().join(owner.to_string()).join("docs");
    std::fs::rename(folder.join("a.txt"), folder.join("b.txt"))?;
    record(
        &app,
        KIND_RENAME,
        owner,
        file_id,
        format!("{owner}/docs/a.txt"),
        Some(format!("{owner}/docs/b.txt")),
    )
    .await?;

    let report = journal::reconcile_pending(&app.state).await?;
    assert_eq!(report.completed, 1);

    let items = app.list("docs", &session).await?;
    assert_eq!(items, vec![("b.txt".to_string(), "file".to_string(), file_id)]);
    Ok(())
}

#[tokio::test]
async fn discards_rename_that_never_happened() -> Result<()> {
    let app = TestApp::new().await?;
    let session = app.login("owner@example.com", "pw").await?;
    let owner = session.user_id;

    app.upload_files(&[("a.txt", b"a")], None, &session).await?;
    record(
        &app,
        KIND_RENAME,
        owner,
        None,
        format!("{owner}/a.txt"),
        Some(format!("{owner}/b.txt")),
    )
    .await?;

    let report = journal::reconcile_pending(&app.state).await?;
    assert_eq!(report.discarded, 1);
    assert_eq!(app.list("", &session).await?[0].0, "a.txt");
    Ok(())
}

#[tokio::test]
async fn finishes_interrupted_delete() -> Result<()> {
    let app = TestApp::new().await?;
    let session = app.login("owner@example.com", "pw").await?;
    let owner = session.user_id;

    app.upload_files(&[("c.txt", b"c")], None, &session).await?;
    let file_id = app.list("", &session).await?[0].2;
    record(
        &app,
        KIND_DELETE,
        owner,
        file_id,
        format!("{owner}/c.txt"),
        None,
    )
    .await?;

    let report = journal::reconcile_pending(&app.state).await?;
    assert_eq!(report.completed, 1);
    assert!(app.list("", &session).await?.is_empty());

    let response = app
        .delete(&format!("/api/files/{}", file_id.unwrap_or_default()), Some(&session))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(pending_count(&app).await?, 0);
    Ok(())
}
