//! Redis backend for the abuse guard.
//!
//! Blocks are JSON strings written with `SET NX EX`, so Redis expires them and an
//! active block is never overwritten. Rolling windows are sorted sets scored by
//! epoch milliseconds and trimmed on every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

use crate::abuse::hashing::BlockScope;
use crate::abuse::store::{AbuseBlock, AbuseStore};
use crate::db::StoreError;

const KEY_PREFIX: &str = "abuse";

#[derive(Clone)]
pub struct RedisAbuseStore {
    conn: MultiplexedConnection,
}

impl RedisAbuseStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn block_key(scope: BlockScope, id_hash: &str) -> String {
    format!("{KEY_PREFIX}:block:{scope}:{id_hash}")
}

fn signup_key(scope: BlockScope, id_hash: &str) -> String {
    format!("{KEY_PREFIX}:signup:{scope}:{id_hash}")
}

fn new_accounts_key(scope: BlockScope, id_hash: &str) -> String {
    format!("{KEY_PREFIX}:new_accounts:{scope}:{id_hash}")
}

/// Seconds until `until`, rounded up, at least 1.
fn ttl_secs(from: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let ms = (until - from).num_milliseconds().max(0);
    u64::try_from((ms + 999) / 1000).unwrap_or(1).max(1)
}

#[async_trait]
impl AbuseStore for RedisAbuseStore {
    async fn find_active_block(
        &self,
        scope: BlockScope,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AbuseBlock>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(block_key(scope, id_hash))
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let block: AbuseBlock = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("abuse block JSON: {e}")))?;
        Ok(block.is_active_at(now).then_some(block))
    }

    async fn put_block(&self, block: &AbuseBlock) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(block)
            .map_err(|e| StoreError::Corrupt(format!("abuse block JSON: {e}")))?;
        let _: Option<String> = redis::cmd("SET")
            .arg(block_key(block.scope, &block.id_hash))
            .arg(body)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(block.created_at, block.expires_at))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn count_signup_events(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("ZCOUNT")
            .arg(signup_key(scope, id_hash))
            .arg(since.timestamp_millis())
            .arg("+inf")
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn record_signup_event(
        &self,
        scope: BlockScope,
        id_hash: &str,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = signup_key(scope, id_hash);
        redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(format!("({}", prune_before.timestamp_millis()))
            .ignore()
            .cmd("ZADD")
            .arg(&key)
            .arg(at.timestamp_millis())
            .arg(Uuid::new_v4().to_string())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(prune_before, at))
            .ignore()
            .query_async::<_, ()>(&mut conn)
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
        let mut conn = self.conn.clone();
        let key = new_accounts_key(scope, id_hash);
        let since_ms = since.timestamp_millis();
        let (count, own_score): (u64, Option<f64>) = redis::pipe()
            .cmd("ZCOUNT")
            .arg(&key)
            .arg(since_ms)
            .arg("+inf")
            .cmd("ZSCORE")
            .arg(&key)
            .arg(excluding.to_string())
            .query_async(&mut conn)
            .await?;

        let own_in_window = own_score.is_some_and(|score| score >= since_ms as f64);
        Ok(if own_in_window {
            count.saturating_sub(1)
        } else {
            count
        })
    }

    async fn record_new_account(
        &self,
        scope: BlockScope,
        id_hash: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = new_accounts_key(scope, id_hash);
        // ZADD on an existing member only moves its score, so each account counts once.
        redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(format!("({}", prune_before.timestamp_millis()))
            .ignore()
            .cmd("ZADD")
            .arg(&key)
            .arg(at.timestamp_millis())
            .arg(user_id.to_string())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl_secs(prune_before, at))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
