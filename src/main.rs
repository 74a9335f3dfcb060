use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use cloudvault::auth::jwt::JwtService;
use cloudvault::config::AppConfig;
use cloudvault::db;
use cloudvault::files::journal;
use cloudvault::routes::create_router;
use cloudvault::state::AppState;
use cloudvault::storage::LocalDiskStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.database_url,
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        uploads_dir = %config.uploads_dir.display(),
        rate_limit_requests = config.rate_limit_requests,
        "loaded server configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let storage = LocalDiskStorage::new(&config.uploads_dir);
    storage.ensure_root().await?;
    let jwt = JwtService::from_config(&config);

    let state = AppState::new(pool, config, Arc::new(storage), jwt);

    let report = journal::reconcile_pending(&state).await?;
    if report.failed > 0 {
        tracing::warn!(failed = report.failed, "some journal operations could not be replayed");
    }

    let listen_addr: SocketAddr = {
        let config = state.config.clone();
        format!("{}:{}", config.server_host, config.server_port).parse()?
    };
    let router = create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
