use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::credits::ledger::next_reset_date;
use crate::credits::plan::PlanTier;
use crate::db::StoreError;
use crate::models::user::{UsageRow, UserRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserUsage {
    pub credits_used: u32,
    pub reset_date: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
}

impl UserUsage {
    /// Usage for an account seen for the first time at `now`.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            credits_used: 0,
            reset_date: next_reset_date(now),
            last_reset: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub plan: PlanTier,
    pub usage: UserUsage,
    pub created_at: DateTime<Utc>,
}

/// Persistence for per-user plan and credit usage.
///
/// Carried by the ledger as `Arc<dyn UsageStore>`.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Loads the account, creating a free-tier record with zero usage if none exists.
    async fn load_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError>;

    /// Zeroes usage and moves `reset_date` to `next_reset` if the stored reset date
    /// is at or before `now`. Returns `None` when no reset was due.
    async fn reset_if_due(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<Option<UserUsage>, StoreError>;

    /// Adds `amount` to usage in one atomic step, unless the result would exceed
    /// `ceiling`. Returns the new total, or `None` if the increment was refused.
    async fn try_increment(
        &self,
        user_id: Uuid,
        amount: u32,
        ceiling: Option<u32>,
    ) -> Result<Option<u32>, StoreError>;

    /// Gives back `amount` credits, never going below zero.
    async fn release(&self, user_id: Uuid, amount: u32) -> Result<(), StoreError>;
}

fn credits_from_db(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

impl From<UsageRow> for UserUsage {
    fn from(row: UsageRow) -> Self {
        Self {
            credits_used: credits_from_db(row.credits_used),
            reset_date: row.reset_date,
            last_reset: row.last_reset,
        }
    }
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        let plan = row.plan.parse().unwrap_or_else(|e| {
            warn!("User {} has {e}; treating as free tier", row.id);
            PlanTier::Free
        });
        Self {
            id: row.id,
            plan,
            usage: UserUsage {
                credits_used: credits_from_db(row.credits_used),
                reset_date: row.reset_date,
                last_reset: row.last_reset,
            },
            created_at: row.created_at,
        }
    }
}

/// `users` table in PostgreSQL.
#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn load_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError> {
        let fresh = UserUsage::fresh(now);
        sqlx::query(
            r#"
            INSERT INTO users (id, plan, credits_used, reset_date, last_reset, created_at)
            VALUES ($1, $2, 0, $3, $4, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(PlanTier::Free.as_str())
        .bind(fresh.reset_date)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row: UserRow = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn reset_if_due(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<Option<UserUsage>, StoreError> {
        let row: Option<UsageRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET credits_used = 0, reset_date = $3, last_reset = $2
            WHERE id = $1 AND reset_date <= $2
            RETURNING credits_used, reset_date, last_reset
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(next_reset)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserUsage::from))
    }

    async fn try_increment(
        &self,
        user_id: Uuid,
        amount: u32,
        ceiling: Option<u32>,
    ) -> Result<Option<u32>, StoreError> {
        let amount = i32::try_from(amount)
            .map_err(|_| StoreError::Corrupt(format!("credit amount {amount} out of range")))?;
        let ceiling = ceiling.map(|c| i32::try_from(c).unwrap_or(i32::MAX));

        // Single conditional UPDATE so concurrent deductions cannot overshoot the ceiling.
        let total: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits_used = credits_used + $2
            WHERE id = $1 AND ($3::INTEGER IS NULL OR credits_used + $2 <= $3)
            RETURNING credits_used
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?;
        Ok(total.map(credits_from_db))
    }

    async fn release(&self, user_id: Uuid, amount: u32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET credits_used = GREATEST(credits_used - $2, 0) WHERE id = $1",
        )
        .bind(user_id)
        .bind(i32::try_from(amount).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
