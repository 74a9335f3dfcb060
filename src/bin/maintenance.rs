use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use cloudvault::{
    auth::{jwt::JwtService, session},
    config::AppConfig,
    db,
    files::journal,
    state::AppState,
    storage::LocalDiskStorage,
};

const USAGE: &str = "Usage: maintenance <reconcile | prune-sessions | create-user <name> <email> <password> [role]>

  reconcile       replay interrupted uploads, renames and deletes.
                  Run only while the server is stopped; it would race
                  requests still in flight.";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("reconcile") => reconcile().await?,
        Some("prune-sessions") => prune_sessions()?,
        Some("create-user") => create_user(&args[1..])?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.database_url,
        pool_size = config.database_max_pool_size,
        "loaded server configuration"
    );
    Ok(config)
}

/// Must not run alongside a live server.
async fn reconcile() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let storage = LocalDiskStorage::new(&config.uploads_dir);
    storage.ensure_root().await?;
    let jwt = JwtService::from_config(&config);
    let state = AppState::new(pool, config, Arc::new(storage), jwt);

    let report = journal::reconcile_pending(&state)
        .await
        .context("failed to reconcile pending operations")?;
    println!(
        "Reconciled journal: {} completed, {} discarded, {} failed.",
        report.completed, report.discarded, report.failed
    );
    Ok(())
}

fn prune_sessions() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let removed = session::prune_expired_sessions(&mut conn, Utc::now().naive_utc())
        .context("failed to prune expired sessions")?;
    println!("Removed {removed} expired sessions.");
    Ok(())
}

fn create_user(args: &[String]) -> Result<()> {
    let [name, email, password, rest @ ..] = args else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    let role = rest.first().map(String::as_str).unwrap_or(session::ROLE_USER);

    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let user = session::create_user(&mut conn, name, email, password, role)
        .with_context(|| format!("failed to create user {email}"))?;
    println!("Created user {} ({}) with role {}.", user.user_id, user.user_email, user.role);
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
