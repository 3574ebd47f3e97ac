pub mod auth;
mod error;
mod system;
mod users;

pub use error::{ApiError, ErrorCode, ValidationErrorBuilder};

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/validate", get(auth::validate));

    // Protected API routes
    let api_routes = Router::new()
        // Users
        .route("/users", get(users::list_users))
        .route("/users", post(users::create_user))
        .route("/users/:id", put(users::update_user))
        .route("/users/:id/status", put(users::update_user_status))
        .route("/users/:id", delete(users::delete_user))
        // Reconciliation and the expiration sweep
        .route("/sync/users", post(users::sync_users))
        .route("/check-expire", post(users::check_expire))
        // Media server probe
        .route("/server/status", get(system::media_status))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
