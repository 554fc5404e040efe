pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::abuse::handlers as abuse;
use crate::ai::handlers as ai;
use crate::cache::handlers as cache;
use crate::credits::handlers as credits;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Credit Ledger
        .route("/api/v1/credits", get(credits::handle_usage_status))
        .route("/api/v1/credits/check", post(credits::handle_credit_check))
        // Abuse Guard
        .route("/api/v1/signup/check", post(abuse::handle_signup_check))
        // AI features (guarded, metered, cached)
        .route("/api/v1/ai/:operation", post(ai::handle_ai_operation))
        .route("/api/v1/cache/stats", get(cache::handle_cache_stats))
        .with_state(state)
}
