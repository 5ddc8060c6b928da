// ============================
// crates/backend-lib/src/handlers/auth.rs
// ============================
//! Login, registration, logout and current-account handlers.
//!
//! Route protection is explicit: `current` resolves the bearer token
//! through the auth service itself instead of relying on a middleware.
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use multiauth_common::{
    CurrentResponse, Guard, LoginRequest, LoginResponse, LogoutRequest, RegisterRequest,
    RegisterResponse,
};

use super::json::ApiJson;
use crate::{error::AppError, AppState};

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Client address for throttling; `x-real-ip` wins only when the
/// deployment says a proxy sets it
fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
        {
            return ip;
        }
    }
    peer.ip()
}

/// `POST /{guard}/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Path(guard): Path<Guard>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let source = client_ip(&headers, peer, state.settings.trust_proxy_headers);
    let session = state.auth.login(guard, &req.email, &req.password, source).await?;

    Ok(Json(LoginResponse {
        token: session.token.clone(),
        expires_in_secs: session.expires_in().as_secs(),
        redirect_to: state.settings.guards.get(guard).redirect_to.clone(),
    }))
}

/// `POST /{guard}/register`
///
/// A fresh account is logged straight in.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(guard): Path<Guard>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth.register(guard, req.into()).await?;
    let session = state.auth.start_session(&account).await;

    let body = RegisterResponse {
        account: account.summary(),
        token: session.token.clone(),
        expires_in_secs: session.expires_in().as_secs(),
        redirect_to: state.settings.guards.get(guard).redirect_to.clone(),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `POST /{guard}/logout`
///
/// Always answers 204, whether or not the token was live.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Path(_guard): Path<Guard>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<LogoutRequest>(&body)
            .ok()
            .and_then(|req| req.token)
    };

    if let Some(token) = from_body.as_deref().or_else(|| bearer_token(&headers)) {
        state.auth.logout(token).await;
    }
    StatusCode::NO_CONTENT
}

/// `GET /{guard}`: name of the account behind the bearer token
pub async fn current(
    State(state): State<Arc<AppState>>,
    Path(guard): Path<Guard>,
    headers: HeaderMap,
) -> Result<Json<CurrentResponse>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthenticated)?;
    let account = state
        .auth
        .current_account(guard, token)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    Ok(Json(CurrentResponse { name: account.name }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_client_ip_respects_proxy_setting() {
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(client_ip(&headers, peer, false), peer.ip());
        assert_eq!(
            client_ip(&headers, peer, true),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_ip(&headers, peer, true), peer.ip());
    }
}
