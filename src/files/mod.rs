//! Owner-scoped file and folder metadata.
//!
//! Content lives under `<uploads>/<owner_id>/<folder>/<filename>`; the
//! `files` table maps each stored file to a synthetic id. Every mutation
//! that touches both disk and database is bracketed by a journal marker
//! (see [`journal`]) so an interrupted request can be finished on restart.

pub mod journal;
pub mod paths;

use std::collections::HashMap;
use std::io::ErrorKind;

use bytes::Bytes;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{File, NewFile, NewShare, Share};
use crate::schema::{files, shares};
use crate::state::AppState;
use crate::storage::STAGING_DIR;

use journal::{KIND_DELETE, KIND_RENAME, KIND_UPLOAD};
use paths::{is_disallowed, join_relative, normalize_folder, owner_path, sanitize_filename};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("file type not allowed: {0}")]
    ForbiddenFileType(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FileResult<T> = Result<T, FileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Folder,
    File,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedItem {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub file_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub path: String,
    pub items: Vec<ListedItem>,
    #[serde(rename = "isEmpty")]
    pub is_empty: bool,
}

pub struct IncomingFile {
    pub original_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct RenameOutcome {
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone)]
pub struct SharedFile {
    pub file: File,
    pub shared_at: NaiveDateTime,
}

pub async fn list_files(state: &AppState, owner_id: i32, folder: &str) -> FileResult<Listing> {
    let folder = normalize_folder(folder)?;

    let entries = match state
        .storage
        .list_dir(&owner_path(owner_id, &folder))
        .await
    {
        Ok(entries) => entries,
        Err(err) => {
            warn!(owner_id, folder = %folder, error = %err, "folder listing unavailable");
            Vec::new()
        }
    };

    let ids = match known_file_ids(state, owner_id, &folder) {
        Ok(ids) => ids,
        Err(err) => {
            warn!(owner_id, folder = %folder, error = %err, "failed to resolve file ids");
            HashMap::new()
        }
    };

    let mut items: Vec<ListedItem> = entries
        .into_iter()
        .map(|entry| {
            if entry.is_dir {
                ListedItem {
                    name: entry.name,
                    item_type: ItemType::Folder,
                    file_id: None,
                }
            } else {
                let file_id = ids.get(&entry.name).copied();
                ListedItem {
                    name: entry.name,
                    item_type: ItemType::File,
                    file_id,
                }
            }
        })
        .collect();
    items.sort_by(|a, b| (a.item_type, &a.name).cmp(&(b.item_type, &b.name)));

    let is_empty = items.is_empty();
    Ok(Listing {
        path: folder,
        items,
        is_empty,
    })
}

fn known_file_ids(
    state: &AppState,
    owner_id: i32,
    folder: &str,
) -> FileResult<HashMap<String, i32>> {
    let mut conn = state.db()?;
    let rows: Vec<(i32, String)> = files::table
        .filter(files::owner_id.eq(owner_id))
        .filter(files::folder.eq(folder))
        .select((files::file_id, files::filename))
        .load(&mut conn)?;
    Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
}

struct StagedFile {
    original_name: String,
    filename: String,
    staging_path: String,
    size_bytes: i64,
}

/// Stores a batch of files in one folder. Names that already exist are
/// replaced and keep their file id.
pub async fn upload_files(
    state: &AppState,
    owner_id: i32,
    folder: &str,
    incoming: Vec<IncomingFile>,
) -> FileResult<Vec<File>> {
    let folder = normalize_folder(folder)?;
    if incoming.is_empty() {
        return Err(FileError::MissingField("files"));
    }

    let mut named = Vec::with_capacity(incoming.len());
    for file in incoming {
        let filename = sanitize_filename(&file.original_name)?;
        if is_disallowed(&filename) {
            warn!(owner_id, filename = %filename, "upload rejected: forbidden file type");
            return Err(FileError::ForbiddenFileType(file.original_name));
        }
        named.push((filename, file));
    }
    ensure_upload_targets(state, owner_id, &folder, &named).await?;

    let mut staged: Vec<StagedFile> = Vec::with_capacity(named.len());
    for (filename, file) in named {
        let staging_path = format!("{STAGING_DIR}/{}", Uuid::new_v4());
        let size_bytes = file.bytes.len() as i64;
        if let Err(err) = state.storage.put(&staging_path, file.bytes).await {
            error!(owner_id, error = %err, "failed to stage upload");
            discard_staged(state, &staged).await;
            return Err(FileError::Io(err));
        }
        staged.push(StagedFile {
            original_name: file.original_name,
            filename,
            staging_path,
            size_bytes,
        });
    }

    let committed = state.db().map_err(FileError::from).and_then(|mut conn| {
        conn.immediate_transaction::<_, FileError, _>(|conn| {
            let now = Utc::now().naive_utc();
            let mut committed = Vec::with_capacity(staged.len());
            for file in &staged {
                let filepath = join_relative(&folder, &file.filename);
                let existing: Option<File> = files::table
                    .filter(files::owner_id.eq(owner_id))
                    .filter(files::filepath.eq(&filepath))
                    .select(File::as_select())
                    .first(conn)
                    .optional()?;

                let row = match existing {
                    Some(existing) => diesel::update(files::table.find(existing.file_id))
                        .set((
                            files::original_name.eq(&file.original_name),
                            files::size_bytes.eq(file.size_bytes),
                            files::created_at.eq(now),
                        ))
                        .returning(File::as_returning())
                        .get_result(conn)?,
                    None => diesel::insert_into(files::table)
                        .values(&NewFile {
                            owner_id,
                            filename: file.filename.clone(),
                            original_name: file.original_name.clone(),
                            folder: folder.clone(),
                            filepath: filepath.clone(),
                            size_bytes: file.size_bytes,
                            created_at: now,
                        })
                        .returning(File::as_returning())
                        .get_result(conn)?,
                };

                let marker = journal::record(
                    conn,
                    KIND_UPLOAD,
                    owner_id,
                    Some(row.file_id),
                    &file.staging_path,
                    Some(owner_path(owner_id, &filepath).as_str()),
                )?;
                committed.push((row, marker));
            }
            Ok(committed)
        })
    });

    let committed = match committed {
        Ok(committed) => committed,
        Err(err) => {
            error!(owner_id, folder = %folder, error = %err, "upload metadata commit failed");
            discard_staged(state, &staged).await;
            return Err(err);
        }
    };

    let mut stored = Vec::with_capacity(committed.len());
    for ((row, marker), file) in committed.into_iter().zip(&staged) {
        let target = owner_path(owner_id, &row.filepath);
        state
            .storage
            .rename(&file.staging_path, &target)
            .await
            .inspect_err(|err| {
                error!(file_id = row.file_id, error = %err, "failed to move staged upload into place");
            })?;
        clear_marker(state, marker);
        stored.push(row);
    }

    info!(owner_id, folder = %folder, count = stored.len(), "files uploaded");
    Ok(stored)
}

/// Rejects a batch whose folder runs through an existing file or whose
/// target names are taken by directories.
async fn ensure_upload_targets(
    state: &AppState,
    owner_id: i32,
    folder: &str,
    named: &[(String, IncomingFile)],
) -> FileResult<()> {
    let mut prefix = String::new();
    for segment in folder.split('/').filter(|segment| !segment.is_empty()) {
        prefix = join_relative(&prefix, segment);
        if state.storage.is_file(&owner_path(owner_id, &prefix)).await? {
            return Err(FileError::InvalidPath(format!("{prefix} is a file")));
        }
    }

    for (filename, _) in named {
        let filepath = join_relative(folder, filename);
        if state.storage.is_dir(&owner_path(owner_id, &filepath)).await? {
            warn!(owner_id, path = %filepath, "upload rejected: target is a folder");
            return Err(FileError::InvalidPath(format!("{filepath} is a folder")));
        }
    }
    Ok(())
}

async fn discard_staged(state: &AppState, staged: &[StagedFile]) {
    for file in staged {
        if let Err(err) = state.storage.remove(&file.staging_path).await {
            warn!(path = %file.staging_path, error = %err, "failed to discard staged upload");
        }
    }
}

pub async fn rename_file(
    state: &AppState,
    owner_id: i32,
    folder: &str,
    filename: &str,
    new_name: Option<&str>,
) -> FileResult<RenameOutcome> {
    let new_name = new_name
        .filter(|value| !value.trim().is_empty())
        .ok_or(FileError::MissingField("newName"))?;
    let folder = normalize_folder(folder)?;
    let old_name = sanitize_filename(filename)?;
    let new_name = sanitize_filename(new_name)?;

    let old_rel = join_relative(&folder, &old_name);
    let new_rel = join_relative(&folder, &new_name);
    let source = owner_path(owner_id, &old_rel);
    let target = owner_path(owner_id, &new_rel);

    // Folders cannot be renamed.
    if !state.storage.is_file(&source).await? {
        warn!(owner_id, path = %old_rel, "rename source is not a file");
        return Err(FileError::NotFound("file"));
    }
    if old_name == new_name {
        return Ok(RenameOutcome { old_name, new_name });
    }
    if state.storage.is_dir(&target).await? {
        return Err(FileError::InvalidPath(format!("{new_rel} is a folder")));
    }

    let marker = {
        let mut conn = state.db()?;
        let file_id: Option<i32> = files::table
            .filter(files::owner_id.eq(owner_id))
            .filter(files::filepath.eq(&old_rel))
            .select(files::file_id)
            .first(&mut conn)
            .optional()?;
        journal::record(
            &mut conn,
            KIND_RENAME,
            owner_id,
            file_id,
            &source,
            Some(target.as_str()),
        )?
    };

    if let Err(err) = state.storage.rename(&source, &target).await {
        warn!(owner_id, from = %source, error = %err, "rename failed on disk");
        clear_marker(state, marker);
        return Err(FileError::NotFound("file"));
    }

    let updated = state
        .db()
        .map_err(FileError::from)
        .and_then(|mut conn| {
            conn.immediate_transaction::<_, FileError, _>(|conn| {
                let updated = apply_rename(conn, owner_id, &old_rel, &new_rel, &new_name)?;
                journal::clear(conn, marker)?;
                Ok(updated)
            })
        });

    match updated {
        Ok(updated) => {
            if updated == 0 {
                warn!(owner_id, path = %old_rel, "renamed file had no metadata row");
            }
            info!(owner_id, from = %old_rel, to = %new_rel, "file renamed");
            Ok(RenameOutcome { old_name, new_name })
        }
        Err(err) => {
            error!(owner_id, error = %err, "rename metadata update failed, reverting disk rename");
            match state.storage.rename(&target, &source).await {
                Ok(()) => clear_marker(state, marker),
                Err(revert_err) => {
                    error!(owner_id, error = %revert_err, "failed to revert disk rename; left for reconciliation");
                }
            }
            Err(err)
        }
    }
}

/// Points the row at `old_rel` to `new_rel`, replacing any row already
/// there. Returns the number of rows moved.
pub(crate) fn apply_rename(
    conn: &mut SqliteConnection,
    owner_id: i32,
    old_rel: &str,
    new_rel: &str,
    new_name: &str,
) -> Result<usize, diesel::result::Error> {
    let displaced: Vec<i32> = files::table
        .filter(files::owner_id.eq(owner_id))
        .filter(files::filepath.eq(new_rel))
        .select(files::file_id)
        .load(conn)?;
    if !displaced.is_empty() {
        diesel::delete(shares::table.filter(shares::file_id.eq_any(&displaced))).execute(conn)?;
        diesel::delete(files::table.filter(files::file_id.eq_any(&displaced))).execute(conn)?;
    }

    diesel::update(
        files::table
            .filter(files::owner_id.eq(owner_id))
            .filter(files::filepath.eq(old_rel)),
    )
    .set((files::filename.eq(new_name), files::filepath.eq(new_rel)))
    .execute(conn)
}

pub async fn delete_file(state: &AppState, owner_id: i32, file_id: i32) -> FileResult<()> {
    let (row, marker) = {
        let mut conn = state.db()?;
        let row: File = files::table
            .filter(files::file_id.eq(file_id))
            .filter(files::owner_id.eq(owner_id))
            .select(File::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(FileError::NotFound("file"))?;
        let marker = journal::record(
            &mut conn,
            KIND_DELETE,
            owner_id,
            Some(file_id),
            &owner_path(owner_id, &row.filepath),
            None,
        )?;
        (row, marker)
    };

    match state
        .storage
        .remove(&owner_path(owner_id, &row.filepath))
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(file_id, path = %row.filepath, "file already missing on disk, removing metadata");
        }
        Err(err) => {
            error!(file_id, error = %err, "could not delete file from disk");
            clear_marker(state, marker);
            return Err(FileError::Io(err));
        }
    }

    let mut conn = state.db()?;
    conn.immediate_transaction::<_, FileError, _>(|conn| {
        remove_file_rows(conn, file_id)?;
        journal::clear(conn, marker)?;
        Ok(())
    })
    .inspect_err(|err| {
        error!(file_id, error = %err, "failed to delete file metadata; left for reconciliation");
    })?;

    info!(owner_id, file_id, "file deleted");
    Ok(())
}

/// Deletes a file row and every share token pointing at it.
pub(crate) fn remove_file_rows(
    conn: &mut SqliteConnection,
    file_id: i32,
) -> Result<(), diesel::result::Error> {
    diesel::delete(shares::table.filter(shares::file_id.eq(file_id))).execute(conn)?;
    diesel::delete(files::table.find(file_id)).execute(conn)?;
    Ok(())
}

pub async fn create_folder(
    state: &AppState,
    owner_id: i32,
    current_folder: Option<&str>,
    new_folder: Option<&str>,
) -> FileResult<String> {
    let new_folder = new_folder
        .filter(|value| !value.trim().is_empty())
        .ok_or(FileError::MissingField("newFolder"))?;
    let current = normalize_folder(current_folder.unwrap_or_default())?;
    let new_folder = normalize_folder(new_folder)?;
    if new_folder.is_empty() {
        return Err(FileError::InvalidPath("folder name is empty".into()));
    }

    let folder_path = join_relative(&current, &new_folder);
    state
        .storage
        .create_dir_all(&owner_path(owner_id, &folder_path))
        .await?;

    info!(owner_id, folder = %folder_path, "folder created");
    Ok(folder_path)
}

pub fn create_share_link(
    state: &AppState,
    owner_id: i32,
    file_id: Option<i32>,
    base_url: &str,
) -> FileResult<String> {
    let file_id = file_id.ok_or(FileError::MissingField("fileId"))?;
    let mut conn = state.db()?;

    let exists: bool = diesel::select(diesel::dsl::exists(
        files::table
            .filter(files::file_id.eq(file_id))
            .filter(files::owner_id.eq(owner_id)),
    ))
    .get_result(&mut conn)?;
    if !exists {
        warn!(owner_id, file_id, "share requested for unknown file");
        return Err(FileError::NotFound("file"));
    }

    let token = generate_share_token();
    diesel::insert_into(shares::table)
        .values(&NewShare {
            token: token.clone(),
            file_id,
            owner_id,
            created_at: Utc::now().naive_utc(),
        })
        .execute(&mut conn)?;

    info!(owner_id, file_id, "share link generated");
    Ok(format!("{}/shared/{token}", base_url.trim_end_matches('/')))
}

pub fn resolve_share_link(state: &AppState, token: &str) -> FileResult<SharedFile> {
    let mut conn = state.db()?;
    let share: Share = shares::table
        .filter(shares::token.eq(token))
        .select(Share::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            warn!("share link not found");
            FileError::NotFound("share link")
        })?;

    let file: File = files::table
        .find(share.file_id)
        .select(File::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            warn!(file_id = share.file_id, "share link points at a missing file");
            FileError::NotFound("file")
        })?;

    Ok(SharedFile {
        file,
        shared_at: share.created_at,
    })
}

pub async fn download_shared(state: &AppState, token: &str) -> FileResult<(File, Vec<u8>)> {
    let shared = resolve_share_link(state, token)?;
    let bytes = read_content(state, &shared.file).await?;
    Ok((shared.file, bytes))
}

pub async fn download_file(
    state: &AppState,
    owner_id: i32,
    folder: &str,
    filename: &str,
) -> FileResult<(File, Vec<u8>)> {
    let folder = normalize_folder(folder)?;
    let filename = sanitize_filename(filename)?;
    let filepath = join_relative(&folder, &filename);

    let file: File = {
        let mut conn = state.db()?;
        files::table
            .filter(files::owner_id.eq(owner_id))
            .filter(files::filepath.eq(&filepath))
            .select(File::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(FileError::NotFound("file"))?
    };

    let bytes = read_content(state, &file).await?;
    info!(owner_id, file_id = file.file_id, "file downloaded");
    Ok((file, bytes))
}

async fn read_content(state: &AppState, file: &File) -> FileResult<Vec<u8>> {
    state
        .storage
        .get(&owner_path(file.owner_id, &file.filepath))
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => {
                warn!(file_id = file.file_id, "file content missing on disk");
                FileError::NotFound("file")
            }
            _ => FileError::Io(err),
        })
}

pub fn list_images(state: &AppState, owner_id: i32) -> FileResult<Vec<File>> {
    let mut conn = state.db()?;
    let rows: Vec<File> = files::table
        .filter(files::owner_id.eq(owner_id))
        .order((files::created_at.desc(), files::file_id.desc()))
        .select(File::as_select())
        .load(&mut conn)?;
    Ok(rows
        .into_iter()
        .filter(|file| paths::is_image(&file.filename))
        .collect())
}

fn clear_marker(state: &AppState, marker: i32) {
    let cleared = state
        .db()
        .map_err(FileError::from)
        .and_then(|mut conn| journal::clear(&mut conn, marker).map_err(FileError::from));
    if let Err(err) = cleared {
        warn!(marker, error = %err, "failed to clear journal marker");
    }
}

fn generate_share_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
