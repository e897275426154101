use crate::AppState;
use crate::auth::Claims;
use crate::error::ApiError;
use crate::handlers::ValidatedJson;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use users_api_protocol::CreateUserRequest;

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users = crate::logic::user::list_users(&state.db).await?;

    Ok((StatusCode::OK, Json(users)))
}

pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user =
        crate::logic::user::create_user(&state.db, &payload.email, payload.name.as_deref())
            .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    crate::logic::user::delete_user(&state.db, &user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Echoes the claims the access guard attached to the request.
pub async fn current_user(
    claims: Option<Extension<Claims>>,
) -> Result<impl IntoResponse, ApiError> {
    let Extension(claims) = claims.ok_or(ApiError::AuthDisabled)?;

    Ok((StatusCode::OK, Json(claims)))
}
