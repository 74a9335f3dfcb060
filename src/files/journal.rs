//! Journal markers for mutations that span disk and database.
//!
//! A marker is written before the disk half of an upload, rename or delete
//! and removed in the same transaction as the database half. Markers left
//! behind by a crash are replayed by [`reconcile_pending`].

use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use tracing::{error, info, warn};

use super::paths::strip_owner;
use super::{apply_rename, remove_file_rows, FileError, FileResult};
use crate::models::{NewPendingOperation, PendingOperation};
use crate::schema::pending_operations;
use crate::state::AppState;

pub const KIND_UPLOAD: &str = "upload";
pub const KIND_RENAME: &str = "rename";
pub const KIND_DELETE: &str = "delete";

pub fn record(
    conn: &mut SqliteConnection,
    kind: &str,
    owner_id: i32,
    file_id: Option<i32>,
    source_path: &str,
    target_path: Option<&str>,
) -> Result<i32, diesel::result::Error> {
    diesel::insert_into(pending_operations::table)
        .values(&NewPendingOperation {
            kind: kind.to_string(),
            owner_id,
            file_id,
            source_path: source_path.to_string(),
            target_path: target_path.map(str::to_string),
            created_at: Utc::now().naive_utc(),
        })
        .returning(pending_operations::id)
        .get_result(conn)
}

pub fn clear(conn: &mut SqliteConnection, id: i32) -> Result<(), diesel::result::Error> {
    diesel::delete(pending_operations::table.find(id)).execute(conn)?;
    Ok(())
}

pub fn pending(conn: &mut SqliteConnection) -> Result<Vec<PendingOperation>, diesel::result::Error> {
    pending_operations::table
        .order(pending_operations::id.asc())
        .select(PendingOperation::as_select())
        .load(conn)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Operations rolled forward to completion.
    pub completed: usize,
    /// Markers dropped because there was nothing left to finish.
    pub discarded: usize,
    /// Markers kept because replaying them failed.
    pub failed: usize,
}

enum Outcome {
    Completed,
    Discarded,
}

pub async fn reconcile_pending(state: &AppState) -> FileResult<ReconcileReport> {
    let operations = {
        let mut conn = state.db()?;
        pending(&mut conn)?
    };

    let mut report = ReconcileReport::default();
    for operation in operations {
        match replay(state, &operation).await {
            Ok(Outcome::Completed) => {
                info!(id = operation.id, kind = %operation.kind, "journal operation rolled forward");
                report.completed += 1;
            }
            Ok(Outcome::Discarded) => {
                info!(id = operation.id, kind = %operation.kind, "journal marker discarded");
                report.discarded += 1;
            }
            Err(err) => {
                error!(id = operation.id, kind = %operation.kind, error = %err, "journal replay failed");
                report.failed += 1;
            }
        }
    }

    if report != ReconcileReport::default() {
        info!(
            completed = report.completed,
            discarded = report.discarded,
            failed = report.failed,
            "journal reconciled"
        );
    }
    Ok(report)
}

async fn replay(state: &AppState, operation: &PendingOperation) -> FileResult<Outcome> {
    match operation.kind.as_str() {
        KIND_UPLOAD => replay_upload(state, operation).await,
        KIND_RENAME => replay_rename(state, operation).await,
        KIND_DELETE => replay_delete(state, operation).await,
        other => {
            warn!(id = operation.id, kind = %other, "unknown journal kind");
            discard(state, operation.id)
        }
    }
}

async fn replay_upload(state: &AppState, operation: &PendingOperation) -> FileResult<Outcome> {
    let Some(target) = operation.target_path.as_deref() else {
        return discard(state, operation.id);
    };
    if !state.storage.exists(&operation.source_path).await? {
        return discard(state, operation.id);
    }

    state.storage.rename(&operation.source_path, target).await?;
    let mut conn = state.db()?;
    clear(&mut conn, operation.id)?;
    Ok(Outcome::Completed)
}

async fn replay_rename(state: &AppState, operation: &PendingOperation) -> FileResult<Outcome> {
    let Some(target) = operation.target_path.as_deref() else {
        return discard(state, operation.id);
    };
    let source_present = state.storage.exists(&operation.source_path).await?;
    let target_present = state.storage.exists(target).await?;
    if source_present || !target_present {
        return discard(state, operation.id);
    }

    let (Some(old_rel), Some(new_rel)) = (
        strip_owner(operation.owner_id, &operation.source_path),
        strip_owner(operation.owner_id, target),
    ) else {
        return Err(FileError::InvalidPath(format!(
            "journal paths outside owner {}",
            operation.owner_id
        )));
    };
    let new_name = new_rel.rsplit('/').next().unwrap_or(new_rel);

    let mut conn = state.db()?;
    conn.immediate_transaction::<_, FileError, _>(|conn| {
        apply_rename(conn, operation.owner_id, old_rel, new_rel, new_name)?;
        clear(conn, operation.id)?;
        Ok(())
    })?;
    Ok(Outcome::Completed)
}

async fn replay_delete(state: &AppState, operation: &PendingOperation) -> FileResult<Outcome> {
    state.storage.remove(&operation.source_path).await?;

    let mut conn = state.db()?;
    conn.immediate_transaction::<_, FileError, _>(|conn| {
        if let Some(file_id) = operation.file_id {
            remove_file_rows(conn, file_id)?;
        }
        clear(conn, operation.id)?;
        Ok(())
    })?;
    Ok(Outcome::Completed)
}

fn discard(state: &AppState, id: i32) -> FileResult<Outcome> {
    let mut conn = state.db()?;
    clear(&mut conn, id)?;
    Ok(Outcome::Discarded)
}
