//! Abuse Guard: signup throttling and new-account AI burst detection.
//!
//! Every check runs the same sequence against hashed identifiers:
//! active block? → deny. Count in rolling window. Threshold reached? → block
//! every scope on the request and deny. Otherwise record the event and allow.
//!
//! The count-then-write sequence is not transactional. Two simultaneous requests
//! can both slip under the threshold; this is best-effort throttling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::abuse::fingerprint::ClientFingerprint;
use crate::abuse::hashing::{short_hash, BlockScope, HashedFingerprint, IdentifierHasher};
use crate::abuse::store::{AbuseBlock, AbuseReason, AbuseStore};
use crate::config::AbuseConfig;
use crate::db::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbuseReason>,
}

impl GuardDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: None,
            reason: None,
        }
    }

    fn deny(reason: AbuseReason, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds: Some(retry_after_seconds),
            reason: Some(reason),
        }
    }
}

/// Whole seconds until `expires_at`, rounded up, at least 1.
fn retry_after(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (expires_at - now).num_milliseconds().max(0);
    u64::try_from((ms + 999) / 1000).unwrap_or(1).max(1)
}

#[derive(Clone)]
pub struct AbuseGuard {
    store: Arc<dyn AbuseStore>,
    hasher: IdentifierHasher,
    config: AbuseConfig,
}

impl AbuseGuard {
    pub fn new(store: Arc<dyn AbuseStore>, config: AbuseConfig) -> Self {
        Self {
            store,
            hasher: IdentifierHasher::new(config.hash_salt.clone()),
            config,
        }
    }

    pub async fn check_signup_attempt(
        &self,
        fingerprint: &ClientFingerprint,
    ) -> Result<GuardDecision, StoreError> {
        self.check_signup_attempt_at(fingerprint, Utc::now()).await
    }

    pub async fn check_signup_attempt_at(
        &self,
        fingerprint: &ClientFingerprint,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        let reason = AbuseReason::SignupThrottled;
        let hashed = self.hasher.hash_fingerprint(fingerprint);

        if let Some(block) = self.active_block(&hashed, now).await? {
            info!(
                "Signup denied: {} {} blocked until {}",
                block.scope,
                short_hash(&block.id_hash),
                block.expires_at
            );
            return Ok(GuardDecision::deny(reason, retry_after(block.expires_at, now)));
        }

        let since = now - self.config.signup_window;
        for (scope, id_hash) in hashed.scopes() {
            let limit = match scope {
                BlockScope::Ip => self.config.max_signups_per_ip,
                BlockScope::Device => self.config.max_signups_per_device,
            };
            let recent = self.store.count_signup_events(scope, id_hash, since).await?;
            if recent >= u64::from(limit) {
                warn!(
                    "Signup burst from {scope} {}: {recent} attempts in window (limit {limit})",
                    short_hash(id_hash)
                );
                return self.trip(&hashed, reason, now).await;
            }
        }

        for (scope, id_hash) in hashed.scopes() {
            self.store
                .record_signup_event(scope, id_hash, now, since)
                .await?;
        }
        debug!("Signup attempt recorded for ip {}", short_hash(&hashed.ip));
        Ok(GuardDecision::allow())
    }

    pub async fn check_ai_burst(
        &self,
        fingerprint: &ClientFingerprint,
        user_id: Uuid,
        account_created_at: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        self.check_ai_burst_at(fingerprint, user_id, account_created_at, Utc::now())
            .await
    }

    /// Only accounts younger than `fresh_account_age` are evaluated, so established
    /// users behind a shared NAT are never throttled by newcomers on the same IP.
    pub async fn check_ai_burst_at(
        &self,
        fingerprint: &ClientFingerprint,
        user_id: Uuid,
        account_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        if now - account_created_at >= self.config.fresh_account_age {
            return Ok(GuardDecision::allow());
        }

        let reason = AbuseReason::AiBlockedNewAccountBurst;
        let hashed = self.hasher.hash_fingerprint(fingerprint);

        if let Some(block) = self.active_block(&hashed, now).await? {
            info!(
                "AI call denied for new account {user_id}: {} {} blocked until {}",
                block.scope,
                short_hash(&block.id_hash),
                block.expires_at
            );
            return Ok(GuardDecision::deny(reason, retry_after(block.expires_at, now)));
        }

        let since = now - self.config.ai_burst_window;
        for (scope, id_hash) in hashed.scopes() {
            let limit = match scope {
                BlockScope::Ip => self.config.max_new_accounts_per_ip,
                BlockScope::Device => self.config.max_new_accounts_per_device,
            };
            let others = self
                .store
                .count_new_accounts(scope, id_hash, since, user_id)
                .await?;
            if others + 1 > u64::from(limit) {
                warn!(
                    "New-account AI burst on {scope} {}: {} fresh accounts in window (limit {limit})",
                    short_hash(id_hash),
                    others + 1
                );
                return self.trip(&hashed, reason, now).await;
            }
        }

        for (scope, id_hash) in hashed.scopes() {
            self.store
                .record_new_account(scope, id_hash, user_id, now, since)
                .await?;
        }
        Ok(GuardDecision::allow())
    }

    async fn active_block(
        &self,
        hashed: &HashedFingerprint,
        now: DateTime<Utc>,
    ) -> Result<Option<AbuseBlock>, StoreError> {
        for (scope, id_hash) in hashed.scopes() {
            if let Some(block) = self.store.find_active_block(scope, id_hash, now).await? {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Blocks every scope present on the request and returns the denial.
    async fn trip(
        &self,
        hashed: &HashedFingerprint,
        reason: AbuseReason,
        now: DateTime<Utc>,
    ) -> Result<GuardDecision, StoreError> {
        let expires_at = now + self.config.block_duration;
        for (scope, id_hash) in hashed.scopes() {
            self.store
                .put_block(&AbuseBlock {
                    scope,
                    id_hash: id_hash.to_string(),
                    reason,
                    created_at: now,
                    expires_at,
                })
                .await?;
        }
        warn!(
            "Abuse block ({reason}) created for ip {} until {expires_at}",
            short_hash(&hashed.ip)
        );
        Ok(GuardDecision::deny(reason, retry_after(expires_at, now)))
    }
}
