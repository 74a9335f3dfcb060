use std::sync::Arc;

use diesel::{
    r2d2::{ConnectionManager, PooledConnection},
    sqlite::SqliteConnection,
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::DbPool,
    ratelimit::RateLimitState,
    storage::FileStorage,
};

pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn FileStorage>,
    pub jwt: JwtService,
    pub rate_limit: RateLimitState,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        config: AppConfig,
        storage: Arc<dyn FileStorage>,
        jwt: JwtService,
    ) -> Self {
        let rate_limit =
            RateLimitState::new(config.rate_limit_requests, config.rate_limit_window_seconds);
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            rate_limit,
        }
    }

    pub fn db(&self) -> Result<DbConnection, diesel::r2d2::PoolError> {
        self.pool.get()
    }
}
