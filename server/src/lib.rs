use axum::{
    Router,
    http::{HeaderValue, header},
    middleware,
    routing::{delete, get},
};
use governor::DefaultDirectRateLimiter;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logic;
pub mod metrics;
pub mod middleware_layer;
pub mod server;

use crate::auth::TokenService;
use crate::config::ServerConfig;
use crate::db::init_db;
use crate::handlers::{auth_handler, probe_handler, user_handler};
use crate::metrics::HttpMetrics;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: sqlx::Pool<sqlx::Sqlite>,
    /// `None` when auth is disabled.
    pub tokens: Option<TokenService>,
    pub metrics: Option<HttpMetrics>,
    pub rate_limiter: DefaultDirectRateLimiter,
    pub config: ServerConfig,
}

pub async fn create_app(config: ServerConfig) -> anyhow::Result<Router> {
    let db_pool = init_db(&config.database_url).await?;
    let state = build_state(config, db_pool)?;
    Ok(router(state))
}

pub fn build_state(
    config: ServerConfig,
    db: sqlx::Pool<sqlx::Sqlite>,
) -> anyhow::Result<AppState> {
    let tokens = match &config.jwt_secret {
        Some(secret) => Some(TokenService::new(
            secret.expose_secret().as_bytes(),
            config.token_ttl,
        )?),
        None => {
            tracing::info!("JWT disabled (no JWT_SECRET); /auth/login returns 501 and /api is open");
            None
        }
    };

    let metrics = if config.metrics_enabled {
        Some(HttpMetrics::new()?)
    } else {
        None
    };

    Ok(Arc::new(AppStateInner {
        db,
        tokens,
        metrics,
        rate_limiter: middleware_layer::build_rate_limiter(&config.rate_limit),
        config,
    }))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/users",
            get(user_handler::list_users).post(user_handler::create_user),
        )
        .route("/users/{id}", delete(user_handler::delete_user))
        .route("/me", get(user_handler::current_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_layer::auth_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit_middleware,
        ));

    let mut public_routes = Router::new()
        .route("/health", get(probe_handler::health))
        .route("/ready", get(probe_handler::ready))
        .route("/version", get(probe_handler::version))
        .merge(auth_handler::router());
    if state.config.metrics_enabled {
        public_routes = public_routes.route("/metrics", get(probe_handler::metrics));
    }

    Router::new()
        .merge(public_routes)
        .nest("/api", api_routes)
        .fallback(error::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_layer::metrics_middleware,
        ))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer::new(
                    [header::AUTHORIZATION],
                ))
                .layer(tower_http::request_id::SetRequestIdLayer::x_request_id(
                    tower_http::request_id::MakeRequestUuid,
                ))
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::request_id::PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(&state.config.cors_origins)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
