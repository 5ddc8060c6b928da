// ==============================
// crates/backend-lib/tests/http_api.rs
// ==============================
//! Drives the axum router the way an HTTP client would.
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use backend_lib::{
    config::{Settings, StorageKind},
    router::create_router,
    storage::{FlatFileStorage, MemoryStorage},
    AppState,
};
use multiauth_common::{CurrentResponse, ErrorBody, LoginResponse, RegisterResponse};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.storage = StorageKind::Memory;
    settings.password.scrypt_log_n = 4;
    settings
}

fn app_with(state: AppState) -> Router {
    let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();
    create_router(Arc::new(state)).layer(MockConnectInfo(peer))
}

fn app() -> Router {
    app_with(AppState::new(MemoryStorage::new(), &test_settings()).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn alice() -> Value {
    json!({
        "name": "Alice",
        "email": "alice@x.com",
        "password": "secret1",
        "password_confirmation": "secret1",
    })
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_login_current_logout() {
    let app = app();

    let response = app.clone().oneshot(post_json("/admin/register", alice())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered: RegisterResponse = body_json(response).await;
    assert_eq!(registered.account.name, "Alice");
    assert_eq!(registered.account.email, "alice@x.com");
    assert_eq!(registered.redirect_to, "/admin");

    // Registration logs the account in
    let response = app
        .clone()
        .oneshot(get_with_token("/admin", &registered.token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let login: LoginResponse = body_json(response).await;
    assert_eq!(login.redirect_to, "/admin");
    assert!((7199..=7200).contains(&login.expires_in_secs));

    let response = app.clone().oneshot(get_with_token("/admin", &login.token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let current: CurrentResponse = body_json(response).await;
    assert_eq!(current.name, "Alice");

    let response = app
        .clone()
        .oneshot(post_json("/admin/logout", json!({"token": login.token})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.clone().oneshot(get_with_token("/admin", &login.token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Logging out again still answers 204
    let response = app
        .clone()
        .oneshot(post_json("/admin/logout", json!({"token": login.token})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_logout_accepts_bearer_header() {
    let app = app();
    let response = app.clone().oneshot(post_json("/user/register", alice())).await.unwrap();
    let registered: RegisterResponse = body_json(response).await;

    let request = Request::builder()
        .method("POST")
        .uri("/user/logout")
        .header(header::AUTHORIZATION, format!("Bearer {}", registered.token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(get_with_token("/user", &registered.token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_current_requires_token() {
    let response = app()
        .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "AUTH_001");
}

#[tokio::test]
async fn test_user_token_does_not_open_admin() {
    let app = app();
    let response = app.clone().oneshot(post_json("/user/register", alice())).await.unwrap();
    let registered: RegisterResponse = body_json(response).await;
    assert_eq!(registered.redirect_to, "/home");

    let response = app.oneshot(get_with_token("/admin", &registered.token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation_and_duplicate() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/register",
            json!({"name": "", "email": "nope", "password": "abc", "password_confirmation": "abc"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "VAL_001");
    let fields = body.error.fields.unwrap();
    assert!(fields.contains_key("name"));
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("password"));

    let response = app.clone().oneshot(post_json("/admin/register", alice())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.clone().oneshot(post_json("/admin/register", alice())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "ACCT_001");
}

#[tokio::test]
async fn test_malformed_bodies_get_the_error_envelope() {
    let app = app();

    // Missing confirmation is reported on the password field
    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/register",
            json!({"name": "Alice", "email": "alice@x.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "VAL_001");
    assert!(body.error.fields.unwrap().contains_key("password"));

    let response = app
        .clone()
        .oneshot(post_json("/admin/login", json!({"email": "alice@x.com"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert!(body.error.fields.unwrap().contains_key("password"));

    let garbled = Request::builder()
        .method("POST")
        .uri("/admin/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\": "))
        .unwrap();
    let response = app.clone().oneshot(garbled).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "VAL_001");
    assert!(body.error.fields.unwrap().contains_key("body"));

    let wrong_type = post_json("/admin/register", json!({"name": 42, "email": []}));
    let response = app.clone().oneshot(wrong_type).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "VAL_001");

    let no_content_type = Request::builder()
        .method("POST")
        .uri("/admin/login")
        .body(Body::from(r#"{"email":"a@x.com","password":"secret1"}"#))
        .unwrap();
    let response = app.oneshot(no_content_type).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert_eq!(body.error.code, "VAL_001");
}

#[tokio::test]
async fn test_oversized_login_password_is_rejected() {
    let response = app()
        .oneshot(post_json(
            "/admin/login",
            json!({"email": "alice@x.com", "password": "p".repeat(1025)}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: ErrorBody = body_json(response).await;
    assert!(body.error.fields.unwrap().contains_key("password"));
}

#[tokio::test]
async fn test_failed_logins_return_401_then_429() {
    let app = app();
    app.clone().oneshot(post_json("/admin/register", alice())).await.unwrap();

    let wrong = json!({"email": "alice@x.com", "password": "wrong-password"});
    for _ in 0..5 {
        let response = app.clone().oneshot(post_json("/admin/login", wrong.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error.code, "AUTH_002");
    }

    let right = json!({"email": "alice@x.com", "password": "secret1"});
    let response = app.clone().oneshot(post_json("/admin/login", right)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_unknown_guard_is_rejected() {
    let response = app()
        .oneshot(post_json(
            "/root/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_flat_file_accounts_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = test_settings();
    settings.storage = StorageKind::FlatFile;
    settings.data_dir = temp_dir.path().to_path_buf();

    let first = app_with(AppState::from_settings(&settings).unwrap());
    let response = first.oneshot(post_json("/admin/register", alice())).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // New state over the same directory: accounts persist, sessions do not
    let second = app_with(AppState::new(FlatFileStorage::new(temp_dir.path()).unwrap(), &settings).unwrap());
    let response = second
        .oneshot(post_json(
            "/admin/login",
            json!({"email": "alice@x.com", "password": "secret1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
