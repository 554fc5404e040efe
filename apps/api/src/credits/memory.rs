//! In-memory `UsageStore` for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::credits::plan::PlanTier;
use crate::credits::store::{UsageStore, UserAccount, UserUsage};
use crate::db::StoreError;

#[derive(Default)]
pub struct MemoryUsageStore {
    accounts: Mutex<HashMap<Uuid, UserAccount>>,
}

impl MemoryUsageStore {
    pub async fn insert(&self, account: UserAccount) {
        self.accounts.lock().await.insert(account.id, account);
    }

    pub async fn get(&self, user_id: Uuid) -> Option<UserAccount> {
        self.accounts.lock().await.get(&user_id).cloned()
    }

    pub async fn set_plan(&self, user_id: Uuid, plan: PlanTier) {
        if let Some(account) = self.accounts.lock().await.get_mut(&user_id) {
            account.plan = plan;
        }
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn load_or_create(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.entry(user_id).or_insert_with(|| UserAccount {
            id: user_id,
            plan: PlanTier::Free,
            usage: UserUsage::fresh(now),
            created_at: now,
        });
        Ok(account.clone())
    }

    async fn reset_if_due(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<Option<UserUsage>, StoreError> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&user_id) else {
            return Ok(None);
        };
        if account.usage.reset_date > now {
            return Ok(None);
        }
        account.usage = UserUsage {
            credits_used: 0,
            reset_date: next_reset,
            last_reset: now,
        };
        Ok(Some(account.usage.clone()))
    }

    async fn try_increment(
        &self,
        user_id: Uuid,
        amount: u32,
        ceiling: Option<u32>,
    ) -> Result<Option<u32>, StoreError> {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(&user_id) else {
            return Ok(None);
        };
        let total = account.usage.credits_used + amount;
        if ceiling.is_some_and(|c| total > c) {
            return Ok(None);
        }
        account.usage.credits_used = total;
        Ok(Some(total))
    }

    async fn release(&self, user_id: Uuid, amount: u32) -> Result<(), StoreError> {
        if let Some(account) = self.accounts.lock().await.get_mut(&user_id) {
            account.usage.credits_used = account.usage.credits_used.saturating_sub(amount);
        }
        Ok(())
    }
}
