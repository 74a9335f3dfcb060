use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(primary_key(user_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub user_name: String,
    pub user_email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = session_tokens)]
#[diesel(belongs_to(User, foreign_key = user_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionToken {
    pub id: i32,
    pub user_id: i32,
    pub refresh_token_hash: String,
    pub access_token_hash: String,
    pub device_name: String,
    pub expires_at: NaiveDateTime,
    pub used: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = session_tokens)]
pub struct NewSessionToken {
    pub user_id: i32,
    pub refresh_token_hash: String,
    pub access_token_hash: String,
    pub device_name: String,
    pub expires_at: NaiveDateTime,
    pub used: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = files)]
#[diesel(primary_key(file_id))]
#[diesel(belongs_to(User, foreign_key = owner_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct File {
    pub file_id: i32,
    pub owner_id: i32,
    pub filename: String,
    pub original_name: String,
    pub folder: String,
    pub filepath: String,
    pub size_bytes: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFile {
    pub owner_id: i32,
    pub filename: String,
    pub original_name: String,
    pub folder: String,
    pub filepath: String,
    pub size_bytes: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = shares)]
#[diesel(primary_key(share_id))]
#[diesel(belongs_to(File, foreign_key = file_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Share {
    pub share_id: i32,
    pub token: String,
    pub file_id: i32,
    pub owner_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shares)]
pub struct NewShare {
    pub token: String,
    pub file_id: i32,
    pub owner_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = pending_operations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingOperation {
    pub id: i32,
    pub kind: String,
    pub owner_id: i32,
    pub file_id: Option<i32>,
    pub source_path: String,
    pub target_path: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = pending_operations)]
pub struct NewPendingOperation {
    pub kind: String,
    pub owner_id: i32,
    pub file_id: Option<i32>,
    pub source_path: String,
    pub target_path: Option<String>,
    pub created_at: NaiveDateTime,
}
