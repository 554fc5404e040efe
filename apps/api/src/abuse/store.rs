use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::abuse::hashing::BlockScope;
use crate::db::StoreError;
use crate::models::abuse::AbuseBlockRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseReason {
    SignupThrottled,
    AiBlockedNewAccountBurst,
}

impl AbuseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AbuseReason::SignupThrottled => "signup_throttled",
            AbuseReason::AiBlockedNewAccountBurst => "ai_blocked_new_account_burst",
        }
    }
}

impl fmt::Display for AbuseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbuseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup_throttled" => Ok(AbuseReason::SignupThrottled),
            "ai_blocked_new_account_burst" => Ok(AbuseReason::AiBlockedNewAccountBurst),
            other => Err(format!("unknown abuse reason '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseBlock {
    pub scope: BlockScope,
    pub id_hash: String,
    pub reason: AbuseReason,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AbuseBlock {
    /// Honoured strictly before `expires_at`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl TryFrom<AbuseBlockRow> for AbuseBlock {
    type Error = StoreError;

    fn try_from(row: AbuseBlockRow) -> Result<Self, Self::Error> {
        Ok(Self {
            scope: row.scope.parse().map_err(StoreError::Corrupt)?,
            reason: row.reason.parse().map_err(StoreError::Corrupt)?,
            id_hash: row.id_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

/// Block list and rolling-window event records, keyed by hashed identifier.
///
/// Implementations never see raw IPs or device ids.
#[async_trait]
pub trait AbuseStore: Send + Sync {
    async fn find_active_block(
        &self,
        scope: BlockScope,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AbuseBlock>, StoreError>;

    /// Stores the block unless an unexpired block already exists for the key.
    async fn put_block(&self, block: &AbuseBlock) -> Result<(), StoreError>;

    async fn count_signup_events(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Records one signup attempt and drops attempts older than `prune_before`.
    async fn record_signup_event(
        &self,
        scope: BlockScope,
        id_hash: &str,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Distinct accounts seen since `since`, not counting `excluding`.
    async fn count_new_accounts(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<u64, StoreError>;

    /// Records (or refreshes) an account under the identifier and drops entries
    /// last seen before `prune_before`.
    async fn record_new_account(
        &self,
        scope: BlockScope,
        id_hash: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

fn count_from_db(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

/// `abuse_blocks`, `signup_signals` and `new_account_signals` in PostgreSQL.
#[derive(Clone)]
pub struct PgAbuseStore {
    pool: PgPool,
}

impl PgAbuseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AbuseStore for PgAbuseStore {
    async fn find_active_block(
        &self,
        scope: BlockScope,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AbuseBlock>, StoreError> {
        let row: Option<AbuseBlockRow> = sqlx::query_as(
            "SELECT * FROM abuse_blocks WHERE scope = $1 AND id_hash = $2 AND expires_at > $3",
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AbuseBlock::try_from).transpose()
    }

    async fn put_block(&self, block: &AbuseBlock) -> Result<(), StoreError> {
        // Only an expired block may be replaced; an active one keeps its original expiry.
        sqlx::query(
            r#"
            INSERT INTO abuse_blocks (scope, id_hash, reason, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (scope, id_hash) DO UPDATE
            SET reason = EXCLUDED.reason,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE abuse_blocks.expires_at <= EXCLUDED.created_at
            "#,
        )
        .bind(block.scope.as_str())
        .bind(&block.id_hash)
        .bind(block.reason.as_str())
        .bind(block.created_at)
        .bind(block.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_signup_events(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signup_signals WHERE scope = $1 AND id_hash = $2 AND created_at >= $3",
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count_from_db(count))
    }

    async fn record_signup_event(
        &self,
        scope: BlockScope,
        id_hash: &str,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO signup_signals (scope, id_hash, created_at) VALUES ($1, $2, $3)")
            .bind(scope.as_str())
            .bind(id_hash)
            .bind(at)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "DELETE FROM signup_signals WHERE scope = $1 AND id_hash = $2 AND created_at < $3",
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(prune_before)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_new_accounts(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM new_account_signals
            WHERE scope = $1 AND id_hash = $2 AND last_seen >= $3 AND user_id <> $4
            "#,
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(since)
        .bind(excluding)
        .fetch_one(&self.pool)
        .await?;
        Ok(count_from_db(count))
    }

    async fn record_new_account(
        &self,
        scope: BlockScope,
        id_hash: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO new_account_signals (scope, id_hash, user_id, last_seen)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope, id_hash, user_id) DO UPDATE SET last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM new_account_signals WHERE scope = $1 AND id_hash = $2 AND last_seen < $3",
        )
        .bind(scope.as_str())
        .bind(id_hash)
        .bind(prune_before)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
