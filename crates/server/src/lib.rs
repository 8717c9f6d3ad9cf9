//! reqlog-server library crate
//!
//! Exposes `build_app`, the audit middleware stack and the stores for
//! integration tests and embedding. The binary entrypoint is in `main.rs`.

pub mod config;
pub mod db;
mod error;
pub mod interceptor;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{Extension, Router, middleware as axum_mw, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::SharedStore;
use interceptor::Interceptor;
use middleware::AdminAuth;

pub use error::{AppError, ErrorBody};

/// State shared by the audit middleware and the admin routes
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub interceptor: Interceptor,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        Self {
            interceptor: Interceptor::new(store.clone()),
            store,
            config: Arc::new(config),
        }
    }
}

/// Wrap `api` so every request it handles is recorded in the audit trail.
///
/// The caller is resolved from `X-API-Key` before the audit entry is opened.
pub fn audited(api: Router, state: &AppState) -> Router {
    api.layer(axum_mw::from_fn_with_state(
        state.clone(),
        middleware::audit_middleware,
    ))
    .layer(axum_mw::from_fn_with_state(
        state.clone(),
        middleware::actor_middleware,
    ))
}

/// Build the full application router with all routes and middleware.
///
/// `api` is mounted under `/api` and audited; the admin, health and metrics
/// routes are not.
pub fn build_app(store: SharedStore, config: &Config, api: Router) -> Router {
    let state = AppState::new(store, config.clone());
    let admin_auth = AdminAuth::new(config.admin_api_key.clone());

    // Audited API routes
    let api_routes = audited(Router::new().nest("/api", api), &state);

    // Operator routes (admin key when configured)
    let admin_routes = routes::admin_routes()
        .layer(axum_mw::from_fn(middleware::admin_auth_middleware))
        .layer(Extension(admin_auth));

    // A second install (every test app after the first) is ignored; the
    // handle still renders this app's recorder.
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let prometheus_handle = recorder.handle();
    let _ = metrics::set_global_recorder(recorder);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::health::metrics))
        .layer(Extension(prometheus_handle));

    // Build CORS layer
    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Build application
    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
        .merge(api_routes)
        .layer(axum_mw::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_mw::from_fn(middleware::metrics_middleware))
}
