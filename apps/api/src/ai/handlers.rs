use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::abuse::ClientFingerprint;
use crate::cache::{with_cache, Cached};
use crate::credits::{AiOperation, CreditCheck};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AiRequest {
    pub user_id: Uuid,
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct AiResponse {
    pub operation: AiOperation,
    pub output: Value,
    pub from_cache: bool,
    pub credits: CreditCheck,
}

/// POST /api/v1/ai/:operation
///
/// Order matters: the operation name is validated before anything is stored,
/// the burst guard runs before credits are charged, and credits are charged
/// before the provider is called. Cache hits are still metered.
pub async fn handle_ai_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    fingerprint: ClientFingerprint,
    Json(req): Json<AiRequest>,
) -> Result<Json<AiResponse>, AppError> {
    let Ok(op) = operation.parse::<AiOperation>() else {
        return Err(AppError::CreditDenied(CreditCheck::invalid_operation()));
    };
    if req.input.is_null() {
        return Err(AppError::Validation("input must not be null".to_string()));
    }

    let account = state.ledger.account(req.user_id).await?;

    let decision = state
        .guard
        .check_ai_burst(&fingerprint, req.user_id, account.created_at)
        .await?;
    if !decision.allowed {
        return Err(AppError::Throttled(decision));
    }

    let credits = state
        .ledger
        .check_and_deduct_credits(req.user_id, &operation, account.plan)
        .await?;
    if !credits.allowed {
        return Err(AppError::CreditDenied(credits));
    }

    let backend = state.ai.clone();
    let input = req.input;
    let result = match state.caches.for_operation(op) {
        Some(cache) => with_cache(cache, &input, || backend.generate(op, &input)).await,
        None => backend.generate(op, &input).await.map(|data| Cached {
            data,
            from_cache: false,
        }),
    };

    let cached = match result {
        Ok(cached) => cached,
        Err(e) => {
            warn!("{op} failed for user {}; refunding charge", req.user_id);
            state.ledger.refund_credits(req.user_id, op).await?;
            return Err(e.into());
        }
    };

    info!(
        "{op} served for user {} (from_cache={}, credits_used={})",
        req.user_id, cached.from_cache, credits.used
    );
    Ok(Json(AiResponse {
        operation: op,
        output: cached.data,
        from_cache: cached.from_cache,
        credits,
    }))
}
