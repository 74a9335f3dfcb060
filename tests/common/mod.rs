use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use cloudvault::auth::jwt::JwtService;
use cloudvault::auth::session;
use cloudvault::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use cloudvault::db::{self, DbPool};
use cloudvault::routes;
use cloudvault::state::AppState;
use cloudvault::storage::LocalDiskStorage;
use diesel::sqlite::SqliteConnection;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

#[allow(dead_code)]
pub const DEFAULT_DEVICE: &str = "test-device";

/// Tokens and device name of one logged-in client.
#[derive(Clone, Debug)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub device: String,
    pub user_id: i32,
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create test directory")?;
        let database_path = dir.path().join("cloudvault.db");
        let uploads_dir = dir.path().join("uploads");

        let mut config = AppConfig {
            database_url: database_path.to_string_lossy().into_owned(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            uploads_dir: uploads_dir.clone(),
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            public_base_url: None,
            cors_allowed_origin: None,
            bootstrap_admin_on_first_login: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rate_limit_requests: 0,
            rate_limit_window_seconds: 900,
        };
        customize(&mut config);

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = LocalDiskStorage::new(&uploads_dir);
        storage.ensure_root().await?;
        let jwt = JwtService::from_config(&config);
        let state = AppState::new(pool, config, Arc::new(storage), jwt);
        let router = routes::create_router(state.clone());

        Ok(Self { state, router, dir })
    }

    #[allow(dead_code)]
    pub fn uploads_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }

    #[allow(dead_code)]
    pub async fn insert_user(&self, name: &str, email: &str, password: &str) -> Result<i32> {
        let name = name.to_string();
        let email = email.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = session::create_user(conn, &name, &email, &password, session::ROLE_USER)
                .context("failed to insert user")?;
            Ok(user.user_id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        self.login_on(email, password, DEFAULT_DEVICE).await
    }

    pub async fn login_on(&self, email: &str, password: &str, device: &str) -> Result<Session> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            user_email: &'a str,
            user_password: &'a str,
            device_name: &'a str,
        }

        #[derive(Deserialize)]
        struct LoginUser {
            user_id: i32,
        }

        #[derive(Deserialize)]
        struct LoginResponse {
            access_token: String,
            refresh_token: String,
            user: LoginUser,
        }

        let response = self
            .post_json(
                "/api/login",
                &LoginPayload {
                    user_email: email,
                    user_password: password,
                    device_name: device,
                },
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let parsed: LoginResponse = read_json_as(response).await?;
        Ok(Session {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            device: device.to_string(),
            user_id: parsed.user.user_id,
        })
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, session).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, session).await
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, session: Option<&Session>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::GET, path, session).await
    }

    #[allow(dead_code)]
    pub async fn delete(
        &self,
        path: &str,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::DELETE, path, session).await
    }

    #[allow(dead_code)]
    pub async fn post_empty(
        &self,
        path: &str,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::POST, path, session).await
    }

    #[allow(dead_code)]
    pub async fn upload_files(
        &self,
        files: &[(&str, &[u8])],
        folder: Option<&str>,
        session: &Session,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (filename, data) in files {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend(*data);
            body.extend(b"\r\n");
        }

        if let Some(folder) = folder {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"folder\"\r\n\r\n");
            body.extend(folder.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = authorize(
            Request::builder()
                .method(Method::POST)
                .uri("/api/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                ),
            Some(session),
        );
        self.send(builder.body(Body::from(body))?).await
    }

    /// Lists a folder and returns `(name, type, file_id)` triples.
    #[allow(dead_code)]
    pub async fn list(
        &self,
        folder: &str,
        session: &Session,
    ) -> Result<Vec<(String, String, Option<i32>)>> {
        let response = self
            .post_json("/api/files", &serde_json::json!({ "folder": folder }), Some(session))
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "listing failed with status {}",
            response.status()
        );
        let listing = read_json(response).await?;
        let items = listing["items"]
            .as_array()
            .ok_or_else(|| anyhow!("listing has no items array"))?;
        Ok(items
            .iter()
            .map(|item| {
                (
                    item["name"].as_str().unwrap_or_default().to_string(),
                    item["type"].as_str().unwrap_or_default().to_string(),
                    item["file_id"].as_i64().map(|id| id as i32),
                )
            })
            .collect())
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let builder = authorize(
            Request::builder()
                .method(method)
                .uri(path)
                .header("content-type", "application/json"),
            session,
        );
        self.send(builder.body(Body::from(body))?).await
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
    ) -> Result<hyper::Response<Body>> {
        let builder = authorize(Request::builder().method(method).uri(path), session);
        self.send(builder.body(Body::empty())?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

fn authorize(
    builder: axum::http::request::Builder,
    session: Option<&Session>,
) -> axum::http::request::Builder {
    match session {
        Some(session) => builder
            .header("authorization", format!("Bearer {}", session.access_token))
            .header("x-device-name", &session.device),
        None => builder,
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn read_json(response: hyper::Response<Body>) -> Result<Value> {
    read_json_as(response).await
}

pub async fn read_json_as<T: serde::de::DeserializeOwned>(
    response: hyper::Response<Body>,
) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body is not the expected JSON")
}

async fn prepare_database(pool: &DbPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || db::run_migrations(&pool))
        .await
        .context("migration task panicked")?
}
