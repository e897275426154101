use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;
use users_api_protocol::{CreateUserRequest, LoginRequest, LoginResponse, User};
use users_api_server::auth::{Claims, TokenService};
use users_api_server::config::{RateLimitConfig, ServerConfig};
use users_api_server::db::init_db;
use users_api_server::{build_state, create_app, router};

const SECRET: &str = "integration-test-secret";

async fn app_with_auth() -> Router {
    create_app(ServerConfig::default().with_jwt_secret(SECRET))
        .await
        .unwrap()
}

async fn app_without_auth() -> Router {
    create_app(ServerConfig::default()).await.unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        })
    };
    (status, value)
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, auth: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn login(app: &Router, email: &str) -> String {
    let body = serde_json::to_value(LoginRequest {
        email: email.to_string(),
    })
    .unwrap();
    let (status, body) = send(app, post_json("/auth/login", None, &body)).await;
    assert_eq!(status, StatusCode::OK);
    let response: LoginResponse = serde_json::from_value(body).unwrap();
    format!("Bearer {}", response.token)
}

#[tokio::test]
async fn test_full_flow() {
    let app = app_with_auth().await;

    // 1. Login
    let auth_header = login(&app, "tester@example.com").await;

    // 2. Create user
    let payload = serde_json::to_value(CreateUserRequest {
        email: "new.user@example.com".to_string(),
        name: Some("Test User".to_string()),
    })
    .unwrap();
    let (status, body) = send(&app, post_json("/api/users", Some(&auth_header), &payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    let user: User = serde_json::from_value(body).unwrap();
    assert_eq!(user.email, "new.user@example.com");
    assert_eq!(user.name.as_deref(), Some("Test User"));

    // 3. List users
    let (status, body) = send(&app, get("/api/users", Some(&auth_header))).await;
    assert_eq!(status, StatusCode::OK);
    let users: Vec<User> = serde_json::from_value(body).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, user.id);

    // 4. Delete user
    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/users/{}", user.id))
            .header("Authorization", &auth_header)
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    // 5. Delete again
    let (status, body) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "User not found");
}

#[tokio::test]
async fn test_guard_exposes_subject() {
    let app = app_with_auth().await;
    let auth_header = login(&app, "alice@example.com").await;

    let (status, body) = send(&app, get("/api/me", Some(&auth_header))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sub"], "alice@example.com");
    assert_eq!(body["email"], "alice@example.com");

    let iat = body["iat"].as_u64().unwrap();
    let exp = body["exp"].as_u64().unwrap();
    assert_eq!(exp - iat, 8 * 3600);
}

#[tokio::test]
async fn test_lowercase_bearer_scheme() {
    let app = app_with_auth().await;
    let auth_header = login(&app, "alice@example.com").await;
    let lowercase = auth_header.replacen("Bearer", "bearer", 1);

    let (status, _) = send(&app, get("/api/users", Some(&lowercase))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_credential() {
    let app = app_with_auth().await;

    let (status, body) = send(&app, get("/api/users", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    assert_eq!(body["error"]["message"], "Invalid or missing token");
}

#[tokio::test]
async fn test_invalid_tokens_are_rejected() {
    let app = app_with_auth().await;
    let valid = login(&app, "alice@example.com").await;

    let mut tampered = valid.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'A' { 'B' } else { 'A' });

    let foreign = TokenService::new(b"some-other-secret", Duration::from_secs(3600))
        .unwrap()
        .mint(Claims::new("mallory"), None);

    let expired = TokenService::new(SECRET.as_bytes(), Duration::from_secs(3600))
        .unwrap()
        .mint_at(Claims::new("alice"), Some(Duration::from_secs(60)), 1_000_000);

    for auth in [
        "Bearer not-a-token".to_string(),
        "Bearer a.b".to_string(),
        tampered,
        format!("Bearer {foreign}"),
        format!("Bearer {expired}"),
    ] {
        let (status, body) = send(&app, get("/api/users", Some(&auth))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{auth}");
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(body["error"]["message"], "Invalid or missing token");
    }
}

#[tokio::test]
async fn test_public_endpoints_need_no_token() {
    let app = app_with_auth().await;

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = send(&app, get("/ready", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = send(&app, get("/version", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["env"], "development");
    assert!(body["sha"].is_null());
    assert!(body["pid"].is_u64());

    let (status, _) = send(&app, get("/metrics", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_not_ready_when_database_is_gone() {
    let db = init_db("sqlite::memory:").await.unwrap();
    let app = router(build_state(ServerConfig::default(), db.clone()).unwrap());
    db.close().await;

    let (status, body) = send(&app, get("/ready", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "ready": false }));

    // Liveness does not depend on the database.
    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_auth_disabled() {
    let app = app_without_auth().await;

    let (status, body) = send(
        &app,
        post_json("/auth/login", None, &json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"]["code"], "AUTH_DISABLED");

    let (status, _) = send(&app, get("/api/users", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/api/me", None)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"]["code"], "AUTH_DISABLED");
}

#[tokio::test]
async fn test_login_validates_body() {
    let app = app_with_auth().await;

    for payload in [
        json!({}),
        json!({ "email": "not-an-email" }),
        json!({ "email": "a@example.com", "role": "admin" }),
    ] {
        let (status, body) = send(&app, post_json("/auth/login", None, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_create_user_validation() {
    let app = app_without_auth().await;

    for payload in [
        json!({}),
        json!({ "email": "nope" }),
        json!({ "email": "a@example.com", "name": "" }),
        json!({ "email": "a@example.com", "admin": true }),
        json!({ "email": format!("{}@example.com", "a".repeat(250)) }),
    ] {
        let (status, body) = send(&app, post_json("/api/users", None, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = app_without_auth().await;
    let payload = json!({ "email": "dup@example.com", "name": null });

    let (status, _) = send(&app, post_json("/api/users", None, &payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, post_json("/api/users", None, &payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = app_with_auth().await;

    let (status, body) = send(&app, get("/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Route not found");
}

#[tokio::test]
async fn test_metrics_reflect_requests() {
    let app = app_without_auth().await;

    send(&app, get("/api/users", None)).await;
    send(&app, get("/api/users", None)).await;

    let (status, body) = send(&app, get("/metrics", None)).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains(r#"http_requests_total{method="GET",route="/api/users",status="200"} 2"#));
    assert!(text.contains("app_up 1"));
}

#[tokio::test]
async fn test_metrics_can_be_disabled() {
    let config = ServerConfig {
        metrics_enabled: false,
        ..ServerConfig::default()
    };
    let app = create_app(config).await.unwrap();

    let (status, _) = send(&app, get("/metrics", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit() {
    let config = ServerConfig {
        rate_limit: RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(3600),
        },
        ..ServerConfig::default()
    };
    let app = create_app(config).await.unwrap();

    for _ in 0..2 {
        let (status, _) = send(&app, get("/api/users", None)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, get("/api/users", None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // Probes are outside the limiter.
    let (status, _) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
}
