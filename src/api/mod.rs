use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

mod admin;
mod anime;
pub mod auth;
mod error;
mod observability;
mod types;
mod user;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn new(shared: Arc<SharedState>, prometheus_handle: Option<PrometheusHandle>) -> Arc<Self> {
        Arc::new(Self {
            shared,
            prometheus_handle,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.shared.config.server;
    let cors_origins = server.cors_allowed_origins.clone();
    let request_timeout = Duration::from_secs(server.request_timeout_seconds.max(1));

    let api_router = Router::new()
        .merge(public_router())
        .merge(user_router(state.clone()))
        .nest("/admin", admin_router(state.clone()));

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/anime/resolve/{identifier}", get(anime::resolve))
        .route("/anime/search", get(anime::search))
        .route("/anime/filter", get(anime::filter))
        .route("/anime/ranked", get(anime::ranked))
        .route("/anime/trending", get(anime::trending))
        .route("/anime/popular", get(anime::popular))
        .route("/anime/spotlight", get(anime::spotlight))
        .route("/anime/movies", get(anime::movies))
        .route("/anime/browse", get(anime::browse))
        .route("/anime/random", get(anime::random))
        .route("/anime/{id}", get(anime::get_anime))
        .route("/images", get(anime::images))
}

fn user_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(user::me))
        .route("/me/stats", get(user::stats))
        .route("/me/list", get(user::list).post(user::add))
        .route(
            "/me/list/{id}",
            get(user::get_entry).delete(user::remove),
        )
        .route("/me/list/{id}/status", patch(user::update_status))
        .route("/me/list/{id}/score", patch(user::update_score))
        .route("/me/list/{id}/progress", patch(user::update_progress))
        .route("/me/list/{id}/notes", patch(user::update_notes))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

fn admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/anime",
            post(admin::create_anime).delete(admin::delete_all),
        )
        .route("/anime/bulk", post(admin::create_many))
        .route(
            "/anime/{id}",
            patch(admin::update_anime).delete(admin::delete_anime),
        )
        .route("/import-dataset", post(admin::import_dataset))
        .route("/backfill", post(admin::backfill))
        .route("/update-season", post(admin::update_season))
        .route("/upgrade-images", post(admin::upgrade_images))
        .route("/users/{id}/role", put(admin::set_role))
        .route("/status", get(admin::status))
        .route_layer(middleware::from_fn(auth::admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
