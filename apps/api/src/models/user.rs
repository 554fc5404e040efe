use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub plan: String,
    pub credits_used: i32,
    pub reset_date: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UsageRow {
    pub credits_used: i32,
    pub reset_date: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
}
