use crate::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match crate::db::ping(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ready": true }))),
        Err(err) => {
            tracing::warn!("Readiness check failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ready": false })))
        }
    }
}

pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    let build = &state.config.build;
    Json(json!({
        "sha": build.git_sha,
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "env": state.config.env.as_str(),
        "fly": {
            "allocId": build.fly_alloc_id,
            "machineId": build.fly_machine_id,
        },
        "time": Utc::now().to_rfc3339(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Route not found".to_string()))?;
    let body = metrics.render().map_err(anyhow::Error::from)?;

    Ok(([(header::CONTENT_TYPE, crate::metrics::CONTENT_TYPE)], body))
}
