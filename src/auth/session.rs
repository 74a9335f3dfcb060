//! Session lifecycle: login, refresh-token rotation, request authentication
//! and logout.
//!
//! Raw tokens never touch the database. Each session row stores the SHA-256
//! of the signed access and refresh tokens together with the client's device
//! name, and there is at most one row per `(user, device)`.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::jwt::{TokenError, TokenKind};
use crate::auth::{password, AuthenticatedUser};
use crate::models::{NewSessionToken, NewUser, SessionToken, User};
use crate::schema::{session_tokens, users};
use crate::state::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
const BOOTSTRAP_ADMIN_NAME: &str = "admin";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("missing token or device name")]
    MissingToken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("password hashing failed: {0}")]
    Hash(anyhow::Error),
    #[error("{0}")]
    Signing(TokenError),
}

impl From<TokenError> for SessionError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Expired => SessionError::TokenExpired,
            TokenError::Invalid => SessionError::InvalidToken,
            signing @ TokenError::Signing(_) => SessionError::Signing(signing),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            user_email: user.user_email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: UserSummary,
}

pub fn login(
    state: &AppState,
    email: Option<&str>,
    password: Option<&str>,
    device_name: Option<&str>,
) -> SessionResult<LoginOutcome> {
    let email = required(email, "user_email")?;
    let password_value = required_raw(password, "user_password")?;
    let device_name = required(device_name, "device_name")?;

    let mut conn = state.db()?;

    if state.config.bootstrap_admin_on_first_login {
        bootstrap_admin(&mut conn, email, password_value)?;
    }

    let user: User = users::table
        .filter(users::user_email.eq(email))
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            warn!(email = %email, "login failed: unknown user");
            SessionError::InvalidCredentials
        })?;

    let valid =
        password::verify_password(password_value, &user.password_hash).unwrap_or_else(|err| {
            warn!(user_id = user.user_id, error = %err, "stored password hash is unreadable");
            false
        });
    if !valid {
        warn!(user_id = user.user_id, "login failed: wrong password");
        return Err(SessionError::InvalidCredentials);
    }

    let tokens = issue_pair(state, user.user_id)?;
    let row = new_session_row(state, user.user_id, device_name, &tokens);

    conn.immediate_transaction::<_, SessionError, _>(|conn| {
        diesel::delete(
            session_tokens::table
                .filter(session_tokens::user_id.eq(user.user_id))
                .filter(session_tokens::device_name.eq(device_name)),
        )
        .execute(conn)?;
        diesel::insert_into(session_tokens::table)
            .values(&row)
            .execute(conn)?;
        Ok(())
    })?;

    info!(user_id = user.user_id, device = %device_name, "user logged in");

    Ok(LoginOutcome {
        tokens,
        user: UserSummary::from(&user),
    })
}

/// Rotates a refresh token. Exactly one caller can consume a given token:
/// the row is claimed with a compare-and-set on `used` before it is
/// replaced, so a concurrent duplicate sees zero affected rows.
pub fn refresh(
    state: &AppState,
    refresh_token: Option<&str>,
    device_name: Option<&str>,
) -> SessionResult<TokenPair> {
    let refresh_token = required(refresh_token, "refreshToken")?;
    let device_name = required(device_name, "device_name")?;
    let refresh_hash = hash_token(refresh_token);

    let mut conn = state.db()?;

    let session: SessionToken = session_tokens::table
        .filter(session_tokens::refresh_token_hash.eq(&refresh_hash))
        .filter(session_tokens::device_name.eq(device_name))
        .select(SessionToken::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            warn!(device = %device_name, "refresh rejected: unknown refresh token");
            SessionError::InvalidToken
        })?;

    if session.used {
        warn!(session_id = session.id, "refresh rejected: token already used");
        return Err(SessionError::InvalidToken);
    }

    let claims = state.jwt.verify_token(refresh_token, TokenKind::Refresh)?;
    if claims.sub != session.user_id {
        return Err(SessionError::InvalidToken);
    }

    let tokens = issue_pair(state, session.user_id)?;
    let row = new_session_row(state, session.user_id, device_name, &tokens);

    conn.immediate_transaction::<_, SessionError, _>(|conn| {
        let claimed = diesel::update(
            session_tokens::table
                .filter(session_tokens::id.eq(session.id))
                .filter(session_tokens::refresh_token_hash.eq(&refresh_hash))
                .filter(session_tokens::used.eq(false)),
        )
        .set(session_tokens::used.eq(true))
        .execute(conn)?;

        if claimed != 1 {
            return Err(SessionError::InvalidToken);
        }

        diesel::delete(session_tokens::table.find(session.id)).execute(conn)?;
        diesel::insert_into(session_tokens::table)
            .values(&row)
            .execute(conn)?;
        Ok(())
    })
    .inspect_err(|err| {
        if matches!(err, SessionError::InvalidToken) {
            warn!(session_id = session.id, "refresh lost rotation race");
        }
    })?;

    info!(user_id = session.user_id, device = %device_name, "session refreshed");
    Ok(tokens)
}

pub fn authenticate(
    state: &AppState,
    access_token: Option<&str>,
    device_name: Option<&str>,
) -> SessionResult<AuthenticatedUser> {
    let access_token = access_token
        .filter(|value| !value.trim().is_empty())
        .ok_or(SessionError::MissingToken)?;
    let device_name = device_name
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SessionError::MissingToken)?;

    let mut conn = state.db()?;

    let row: Option<(SessionToken, User)> = session_tokens::table
        .inner_join(users::table)
        .filter(session_tokens::access_token_hash.eq(hash_token(access_token)))
        .filter(session_tokens::device_name.eq(device_name))
        .select((SessionToken::as_select(), User::as_select()))
        .first(&mut conn)
        .optional()?;

    let (session, user) = row.ok_or(SessionError::InvalidToken)?;
    if session.used {
        return Err(SessionError::InvalidToken);
    }

    let claims = state.jwt.verify_token(access_token, TokenKind::Access)?;
    if claims.sub != session.user_id {
        return Err(SessionError::InvalidToken);
    }

    Ok(AuthenticatedUser {
        user_id: user.user_id,
        user_name: user.user_name,
        user_email: user.user_email,
        role: user.role,
        device_name: device_name.to_string(),
    })
}

/// Drops the session bound to the presented access token and device.
/// Expiry is ignored and unknown tokens are a no-op.
pub fn logout(state: &AppState, access_token: Option<&str>, device_name: Option<&str>) {
    let (Some(access_token), Some(device_name)) = (access_token, device_name) else {
        return;
    };

    let mut conn = match state.db() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(error = %err, "logout skipped: database pool error");
            return;
        }
    };

    match diesel::delete(
        session_tokens::table
            .filter(session_tokens::access_token_hash.eq(hash_token(access_token)))
            .filter(session_tokens::device_name.eq(device_name.trim())),
    )
    .execute(&mut conn)
    {
        Ok(removed) => info!(device = %device_name, removed, "logout processed"),
        Err(err) => warn!(error = %err, "failed to remove session on logout"),
    }
}

pub fn prune_expired_sessions(
    conn: &mut SqliteConnection,
    now: NaiveDateTime,
) -> SessionResult<usize> {
    Ok(
        diesel::delete(session_tokens::table.filter(session_tokens::expires_at.le(now)))
            .execute(conn)?,
    )
}

pub fn create_user(
    conn: &mut SqliteConnection,
    user_name: &str,
    email: &str,
    password_value: &str,
    role: &str,
) -> SessionResult<User> {
    let password_hash = password::hash_password(password_value).map_err(SessionError::Hash)?;
    let new_user = NewUser {
        user_name: user_name.to_string(),
        user_email: email.to_string(),
        password_hash,
        role: role.to_string(),
        created_at: Utc::now().naive_utc(),
    };

    Ok(diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)?)
}

fn bootstrap_admin(
    conn: &mut SqliteConnection,
    email: &str,
    password_value: &str,
) -> SessionResult<()> {
    let existing: i64 = users::table.count().get_result(conn)?;
    if existing > 0 {
        return Ok(());
    }

    // Hash outside the write lock; the count is re-checked inside it.
    let password_hash = password::hash_password(password_value).map_err(SessionError::Hash)?;
    let created = conn.immediate_transaction::<_, SessionError, _>(|conn| {
        let existing: i64 = users::table.count().get_result(conn)?;
        if existing > 0 {
            return Ok(false);
        }
        diesel::insert_into(users::table)
            .values(&NewUser {
                user_name: BOOTSTRAP_ADMIN_NAME.to_string(),
                user_email: email.to_string(),
                password_hash,
                role: ROLE_ADMIN.to_string(),
                created_at: Utc::now().naive_utc(),
            })
            .execute(conn)?;
        Ok(true)
    })?;

    if created {
        warn!(email = %email, "user store was empty; bootstrapped admin account");
    }
    Ok(())
}

fn issue_pair(state: &AppState, user_id: i32) -> SessionResult<TokenPair> {
    Ok(TokenPair {
        access_token: state.jwt.generate_token(user_id, TokenKind::Access)?,
        refresh_token: state.jwt.generate_token(user_id, TokenKind::Refresh)?,
    })
}

fn new_session_row(
    state: &AppState,
    user_id: i32,
    device_name: &str,
    tokens: &TokenPair,
) -> NewSessionToken {
    let now = Utc::now();
    NewSessionToken {
        user_id,
        refresh_token_hash: hash_token(&tokens.refresh_token),
        access_token_hash: hash_token(&tokens.access_token),
        device_name: device_name.to_string(),
        expires_at: (now + state.jwt.refresh_expiry()).naive_utc(),
        used: false,
        created_at: now.naive_utc(),
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> SessionResult<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SessionError::MissingField(field))
}

fn required_raw<'a>(value: Option<&'a str>, field: &'static str) -> SessionResult<&'a str> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(SessionError::MissingField(field))
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
