use axum::{extract::State, Json};

use crate::abuse::fingerprint::ClientFingerprint;
use crate::abuse::guard::GuardDecision;
use crate::errors::AppError;
use crate::state::AppState;

/// POST /api/v1/signup/check
/// Pre-flight for account creation. 429 with `Retry-After` when throttled.
pub async fn handle_signup_check(
    State(state): State<AppState>,
    fingerprint: ClientFingerprint,
) -> Result<Json<GuardDecision>, AppError> {
    let decision = state.guard.check_signup_attempt(&fingerprint).await?;
    if !decision.allowed {
        return Err(AppError::Throttled(decision));
    }
    Ok(Json(decision))
}
