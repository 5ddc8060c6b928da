// ============================
// crates/backend-lib/src/router.rs
// ============================
/** HTTP router for the auth server.
Every guard gets the same four routes; the guard name is the first path
segment (`/admin/login`, `/user/login`, ...). */
use crate::{handlers::auth, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/{guard}", get(auth::current))
        .route("/{guard}/login", post(auth::login))
        .route("/{guard}/register", post(auth::register))
        .route("/{guard}/logout", post(auth::logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "Healthy"
}
