use crate::AppState;
use crate::auth::TokenError;
use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Instant;

/// Admits the request only with a valid bearer token and exposes the decoded
/// claims as an `Extension<Claims>`. Passes everything through when auth is
/// disabled.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(tokens) = state.tokens.as_ref() else {
        return Ok(next.run(req).await);
    };

    let token = bearer_token(req.headers())?;
    let claims = tokens.verify(token)?;
    tracing::debug!(subject = %claims.sub, "Authenticated request");

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extracts the credential from `Authorization: Bearer <token>`. The scheme
/// word is matched case-insensitively and is followed by exactly one space;
/// the token itself may not contain whitespace.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(TokenError::MissingCredential)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(TokenError::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::MissingCredential);
    }

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(TokenError::MissingCredential);
    }
    Ok(token)
}

pub async fn metrics_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(metrics) = state.metrics.as_ref() else {
        return next.run(req).await;
    };

    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(req).await;

    metrics.observe(&method, &route, response.status().as_u16(), start.elapsed());
    response
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.rate_limiter.check().is_err() {
        tracing::warn!(path = %req.uri().path(), "Rate limit exceeded");
        return Err(ApiError::RateLimited);
    }
    Ok(next.run(req).await)
}

/// `max_requests` per `window`, with bursts up to `max_requests`.
pub fn build_rate_limiter(config: &RateLimitConfig) -> DefaultDirectRateLimiter {
    let burst = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(config.window / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}
