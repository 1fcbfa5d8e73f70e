//! HTTP routes

pub mod billing;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/webhook", post(webhooks::handle_webhook))
        .route("/public-key", get(billing::get_public_key))
        .route("/create-customer", post(billing::create_customer))
        .route("/subscription", post(billing::get_subscription));

    if let Some(dir) = &state.config.static_dir {
        tracing::info!(path = %dir.display(), "Serving static files");
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.with_state(state)
}
