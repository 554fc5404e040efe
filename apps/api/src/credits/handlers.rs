use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::credits::ledger::{CreditCheck, UsageStatus};
use crate::credits::operation::AiOperation;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreditCheckRequest {
    pub user_id: Uuid,
    pub operation: String,
}

/// GET /api/v1/credits
pub async fn handle_usage_status(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<UsageStatus>, AppError> {
    Ok(Json(state.ledger.usage_status(params.user_id).await?))
}

/// POST /api/v1/credits/check
/// Reports whether the operation would be allowed, without charging.
/// Unknown operation names are answered before the account is loaded.
pub async fn handle_credit_check(
    State(state): State<AppState>,
    Json(req): Json<CreditCheckRequest>,
) -> Result<Json<CreditCheck>, AppError> {
    let operation = match req.operation.parse::<AiOperation>() {
        Ok(op) => op,
        Err(e) => {
            debug!("Credit check for user {} rejected: {e}", req.user_id);
            return Ok(Json(CreditCheck::invalid_operation()));
        }
    };

    let account = state.ledger.account(req.user_id).await?;
    let check = state
        .ledger
        .check_credits(req.user_id, operation, account.plan)
        .await?;
    Ok(Json(check))
}
