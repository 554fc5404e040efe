//! In-memory `AbuseStore` for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::abuse::hashing::BlockScope;
use crate::abuse::store::{AbuseBlock, AbuseStore};
use crate::db::StoreError;

type Key = (BlockScope, String);

#[derive(Default)]
pub struct MemoryAbuseStore {
    blocks: Mutex<HashMap<Key, AbuseBlock>>,
    signups: Mutex<HashMap<Key, Vec<DateTime<Utc>>>>,
    new_accounts: Mutex<HashMap<Key, HashMap<Uuid, DateTime<Utc>>>>,
}

impl MemoryAbuseStore {
    pub async fn block(&self, scope: BlockScope, id_hash: &str) -> Option<AbuseBlock> {
        self.blocks
            .lock()
            .await
            .get(&(scope, id_hash.to_string()))
            .cloned()
    }

    pub async fn block_count(&self) -> usize {
        self.blocks.lock().await.len()
    }

    pub async fn signup_events(&self, scope: BlockScope, id_hash: &str) -> usize {
        self.signups
            .lock()
            .await
            .get(&(scope, id_hash.to_string()))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl AbuseStore for MemoryAbuseStore {
    async fn find_active_block(
        &self,
        scope: BlockScope,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AbuseBlock>, StoreError> {
        Ok(self
            .blocks
            .lock()
            .await
            .get(&(scope, id_hash.to_string()))
            .filter(|b| b.is_active_at(now))
            .cloned())
    }

    async fn put_block(&self, block: &AbuseBlock) -> Result<(), StoreError> {
        let mut blocks = self.blocks.lock().await;
        let key = (block.scope, block.id_hash.clone());
        let replaceable = blocks
            .get(&key)
            .map_or(true, |existing| !existing.is_active_at(block.created_at));
        if replaceable {
            blocks.insert(key, block.clone());
        }
        Ok(())
    }

    async fn count_signup_events(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .signups
            .lock()
            .await
            .get(&(scope, id_hash.to_string()))
            .map_or(0, |events| events.iter().filter(|t| **t >= since).count() as u64))
    }

    async fn record_signup_event(
        &self,
        scope: BlockScope,
        id_hash: &str,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut signups = self.signups.lock().await;
        let events = signups.entry((scope, id_hash.to_string())).or_default();
        events.retain(|t| *t >= prune_before);
        events.push(at);
        Ok(())
    }

    async fn count_new_accounts(
        &self,
        scope: BlockScope,
        id_hash: &str,
        since: DateTime<Utc>,
        excluding: Uuid,
    ) -> Result<u64, StoreError> {
        Ok(self
            .new_accounts
            .lock()
            .await
            .get(&(scope, id_hash.to_string()))
            .map_or(0, |users| {
                users
                    .iter()
                    .filter(|(id, seen)| **id != excluding && **seen >= since)
                    .count() as u64
            }))
    }

    async fn record_new_account(
        &self,
        scope: BlockScope,
        id_hash: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
        prune_before: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut new_accounts = self.new_accounts.lock().await;
        let users = new_accounts.entry((scope, id_hash.to_string())).or_default();
        users.retain(|_, seen| *seen >= prune_before);
        users.insert(user_id, at);
        Ok(())
    }
}
