use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, ratelimit, state::AppState};

pub mod auth;
pub mod files;
pub mod folders;
pub mod health;
pub mod shares;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());

    let public_api = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout));

    let protected_api = Router::new()
        .route("/me", get(auth::me))
        .route("/files", post(files::list_files))
        .route("/upload", post(files::upload_files))
        .route("/images", post(files::list_images))
        .route("/files/:file/download", get(files::download_file))
        .route("/files/:file/rename", put(files::rename_file))
        .route("/files/:file", delete(files::delete_file))
        .route("/create-folder", post(folders::create_folder))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(
            state.clone(),
        ));

    let share_link_routes = Router::new()
        .route("/gsl", post(shares::create_share_link))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(
            state.clone(),
        ));

    let limited = Router::new()
        .nest("/api", public_api.merge(protected_api))
        .merge(share_link_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::limit_requests,
        ));

    let shared_routes = Router::new()
        .route("/share/:token", get(shares::resolve_share_link))
        .route("/share/:token/download", get(shares::download_shared));

    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/hp", get(health::health_check))
        .merge(limited)
        .merge(shared_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

fn build_cors(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
