use crate::AppState;
use crate::auth::Claims;
use crate::error::ApiError;
use crate::handlers::ValidatedJson;
use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use users_api_protocol::{LoginRequest, LoginResponse};

/// Email-only login: the email becomes the token subject.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<ValidatedJson<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.tokens.as_ref().ok_or(ApiError::AuthDisabled)?;
    let ValidatedJson(payload) = payload?;

    let claims = Claims::new(payload.email.clone()).with_claim("email", payload.email);
    let token = tokens.mint(claims, Some(state.config.login_token_ttl));

    Ok((StatusCode::OK, Json(LoginResponse { token })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}
