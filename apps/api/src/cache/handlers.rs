use axum::{extract::State, Json};

use crate::cache::registry::NamedCacheStats;
use crate::state::AppState;

/// GET /api/v1/cache/stats
pub async fn handle_cache_stats(State(state): State<AppState>) -> Json<Vec<NamedCacheStats>> {
    Json(state.caches.stats())
}
