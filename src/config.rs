use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 512;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub uploads_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub public_base_url: Option<Url>,
    pub cors_allowed_origin: Option<String>,
    pub bootstrap_admin_on_first_login: bool,
    pub max_upload_bytes: usize,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let uploads_dir = env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "cloudvault".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "cloudvault-clients".to_string());
        let access_token_expiry_minutes = env::var("ACCESS_TOKEN_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("ACCESS_TOKEN_EXPIRY_MINUTES must be an integer")?;
        let refresh_token_expiry_days = env::var("REFRESH_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .context("REFRESH_TOKEN_EXPIRY_DAYS must be an integer")?;
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|raw| parse_base_url(&raw))
            .transpose()?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let bootstrap_admin_on_first_login = env::var("BOOTSTRAP_ADMIN_ON_FIRST_LOGIN")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let rate_limit_requests = env::var("RATE_LIMIT_REQUESTS")
            .unwrap_or_else(|_| "200".to_string())
            .parse()
            .context("RATE_LIMIT_REQUESTS must be an integer")?;
        let rate_limit_window_seconds = env::var("RATE_LIMIT_WINDOW_SECONDS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .context("RATE_LIMIT_WINDOW_SECONDS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            uploads_dir,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            access_token_expiry_minutes,
            refresh_token_expiry_days,
            public_base_url,
            cors_allowed_origin,
            bootstrap_admin_on_first_login,
            max_upload_bytes,
            rate_limit_requests,
            rate_limit_window_seconds,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).context("PUBLIC_BASE_URL must be an absolute URL")?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "PUBLIC_BASE_URL must use http or https"
    );
    Ok(url)
}
