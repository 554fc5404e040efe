//! Credit Ledger: monthly AI credit metering per user.
//!
//! Flow for a metered call: load account → lazy monthly reset → plan gate →
//! balance check → conditional atomic increment.
//!
//! Denials (`insufficient_credits`, `premium_required`, `invalid_operation`) are
//! returned in `CreditCheck::reason`. Only storage failures are errors.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credits::operation::AiOperation;
use crate::credits::plan::PlanTier;
use crate::credits::store::{UsageStore, UserAccount, UserUsage};
use crate::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditDenial {
    InsufficientCredits,
    PremiumRequired,
    InvalidOperation,
}

impl CreditDenial {
    pub fn code(self) -> &'static str {
        match self {
            CreditDenial::InsufficientCredits => "insufficient_credits",
            CreditDenial::PremiumRequired => "premium_required",
            CreditDenial::InvalidOperation => "invalid_operation",
        }
    }
}

/// Outcome of a credit check or deduction.
///
/// `limit` and `remaining` are `None` for unlimited plans. `reset_date` is `None`
/// only for `invalid_operation`, which is decided without reading usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditCheck {
    pub allowed: bool,
    pub required: u32,
    pub used: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CreditDenial>,
}

impl CreditCheck {
    pub fn invalid_operation() -> Self {
        Self {
            allowed: false,
            required: 0,
            used: 0,
            limit: None,
            remaining: None,
            reset_date: None,
            reason: Some(CreditDenial::InvalidOperation),
        }
    }
}

/// Snapshot of a user's plan and usage, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStatus {
    pub plan: PlanTier,
    pub used: u32,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_date: DateTime<Utc>,
    pub last_reset: DateTime<Utc>,
}

/// First instant (00:00 UTC) of the month after `now`.
pub fn next_reset_date(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("the first day of a month is always a valid UTC instant")
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn UsageStore>,
    free_monthly_credits: u32,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn UsageStore>, free_monthly_credits: u32) -> Self {
        Self {
            store,
            free_monthly_credits,
        }
    }

    /// Loads the account and applies the monthly reset if it is due.
    pub async fn account(&self, user_id: Uuid) -> Result<UserAccount, StoreError> {
        self.account_at(user_id, Utc::now()).await
    }

    pub async fn account_at(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UserAccount, StoreError> {
        let mut account = self.store.load_or_create(user_id, now).await?;
        if now < account.usage.reset_date {
            return Ok(account);
        }

        let next = next_reset_date(now);
        match self.store.reset_if_due(user_id, now, next).await? {
            Some(usage) => {
                info!(
                    "Monthly credit reset for user {user_id}: {} credits cleared, next reset {next}",
                    account.usage.credits_used
                );
                account.usage = usage;
            }
            // Another request reset it first; pick up its result.
            None => account = self.store.load_or_create(user_id, now).await?,
        }
        Ok(account)
    }

    pub async fn usage_status(&self, user_id: Uuid) -> Result<UsageStatus, StoreError> {
        let account = self.account(user_id).await?;
        let limit = account.plan.credit_limit(self.free_monthly_credits);
        Ok(UsageStatus {
            plan: account.plan,
            used: account.usage.credits_used,
            limit,
            remaining: limit.map(|l| l.saturating_sub(account.usage.credits_used)),
            reset_date: account.usage.reset_date,
            last_reset: account.usage.last_reset,
        })
    }

    pub async fn check_credits(
        &self,
        user_id: Uuid,
        operation: AiOperation,
        plan: PlanTier,
    ) -> Result<CreditCheck, StoreError> {
        self.check_credits_at(user_id, operation, plan, Utc::now())
            .await
    }

    pub async fn check_credits_at(
        &self,
        user_id: Uuid,
        operation: AiOperation,
        plan: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<CreditCheck, StoreError> {
        let account = self.account_at(user_id, now).await?;
        Ok(self.evaluate(operation, plan, &account.usage))
    }

    pub async fn deduct_credits(
        &self,
        user_id: Uuid,
        operation: AiOperation,
        plan: PlanTier,
    ) -> Result<CreditCheck, StoreError> {
        self.deduct_credits_at(user_id, operation, plan, Utc::now())
            .await
    }

    /// Re-checks, then charges `operation.cost()` with a conditional increment.
    pub async fn deduct_credits_at(
        &self,
        user_id: Uuid,
        operation: AiOperation,
        plan: PlanTier,
        now: DateTime<Utc>,
    ) -> Result<CreditCheck, StoreError> {
        let check = self.check_credits_at(user_id, operation, plan, now).await?;
        if !check.allowed {
            info!(
                "Credit deduction denied for user {user_id} ({operation}): {:?}",
                check.reason
            );
            return Ok(check);
        }

        let ceiling = plan.credit_limit(self.free_monthly_credits);
        match self
            .store
            .try_increment(user_id, check.required, ceiling)
            .await?
        {
            Some(used) => {
                debug!("Charged {} credits to user {user_id} for {operation}", check.required);
                Ok(CreditCheck {
                    used,
                    remaining: ceiling.map(|c| c.saturating_sub(used)),
                    ..check
                })
            }
            None => {
                warn!("Concurrent deduction for user {user_id} exhausted credits before {operation}");
                let account = self.account_at(user_id, now).await?;
                let mut denied = self.evaluate(operation, plan, &account.usage);
                denied.allowed = false;
                denied.reason = Some(CreditDenial::InsufficientCredits);
                Ok(denied)
            }
        }
    }

    /// Handler entry point: parse the operation name, then check and charge.
    pub async fn check_and_deduct_credits(
        &self,
        user_id: Uuid,
        operation: &str,
        plan: PlanTier,
    ) -> Result<CreditCheck, StoreError> {
        match operation.parse::<AiOperation>() {
            Ok(op) => self.deduct_credits(user_id, op, plan).await,
            Err(e) => {
                debug!("Credit deduction for user {user_id} rejected: {e}");
                Ok(CreditCheck::invalid_operation())
            }
        }
    }

    /// Returns the credits charged for `operation`, for calls that failed upstream
    /// after being charged.
    pub async fn refund_credits(
        &self,
        user_id: Uuid,
        operation: AiOperation,
    ) -> Result<(), StoreError> {
        self.store.release(user_id, operation.cost()).await?;
        info!("Refunded {} credits to user {user_id} for failed {operation}", operation.cost());
        Ok(())
    }

    fn evaluate(&self, operation: AiOperation, plan: PlanTier, usage: &UserUsage) -> CreditCheck {
        let required = operation.cost();
        let limit = plan.credit_limit(self.free_monthly_credits);
        let used = usage.credits_used;

        let reason = if operation.premium_only() && !plan.is_premium() {
            Some(CreditDenial::PremiumRequired)
        } else if limit.is_some_and(|l| used.saturating_add(required) > l) {
            Some(CreditDenial::InsufficientCredits)
        } else {
            None
        };

        CreditCheck {
            allowed: reason.is_none(),
            required,
            used,
            limit,
            remaining: limit.map(|l| l.saturating_sub(used)),
            reset_date: Some(usage.reset_date),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::memory::MemoryUsageStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    const FREE_CREDITS: u32 = 10;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn ledger() -> (CreditLedger, Arc<MemoryUsageStore>) {
        let store = Arc::new(MemoryUsageStore::default());
        (CreditLedger::new(store.clone(), FREE_CREDITS), store)
    }

    /// Lets another request charge `competing` credits after the balance check
    /// but before this request's increment.
    struct RacingStore {
        inner: Arc<MemoryUsageStore>,
        competing: u32,
        raced: AtomicBool,
    }

    #[async_trait]
    impl UsageStore for RacingStore {
        async fn load_or_create(
            &self,
            user_id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<UserAccount, StoreError> {
            self.inner.load_or_create(user_id, now).await
        }

        async fn reset_if_due(
            &self,
            user_id: Uuid,
            now: DateTime<Utc>,
            next_reset: DateTime<Utc>,
        ) -> Result<Option<UserUsage>, StoreError> {
            self.inner.reset_if_due(user_id, now, next_reset).await
        }

        async fn try_increment(
            &self,
            user_id: Uuid,
            amount: u32,
            ceiling: Option<u32>,
        ) -> Result<Option<u32>, StoreError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let won = self
                    .inner
                    .try_increment(user_id, self.competing, ceiling)
                    .await?;
                assert!(won.is_some());
            }
            self.inner.try_increment(user_id, amount, ceiling).await
        }

        async fn release(&self, user_id: Uuid, amount: u32) -> Result<(), StoreError> {
            self.inner.release(user_id, amount).await
        }
    }

    #[test]
    fn test_next_reset_date_mid_month() {
        assert_eq!(
            next_reset_date(at(2025, 3, 17)),
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_reset_date_rolls_year() {
        assert_eq!(
            next_reset_date(at(2025, 12, 31)),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_new_user_starts_with_full_balance() {
        let (ledger, _) = ledger();
        let now = at(2025, 5, 10);
        let check = ledger
            .check_credits_at(Uuid::new_v4(), AiOperation::EnhanceBullet, PlanTier::Free, now)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.used, 0);
        assert_eq!(check.remaining, Some(FREE_CREDITS));
        assert_eq!(check.reset_date, Some(next_reset_date(now)));
    }

    #[tokio::test]
    async fn test_repeated_deductions_accumulate() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);
        let op = AiOperation::GenerateSummary;

        for _ in 0..4 {
            let check = ledger
                .deduct_credits_at(user, op, PlanTier::Free, now)
                .await
                .unwrap();
            assert!(check.allowed);
        }

        let account = store.get(user).await.unwrap();
        assert_eq!(account.usage.credits_used, 4 * op.cost());
    }

    #[tokio::test]
    async fn test_free_tier_never_exceeds_ceiling() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        // 3 credits each: 3 succeed (9), the 4th would make 12 > 10.
        let mut allowed = 0;
        for _ in 0..6 {
            let check = ledger
                .deduct_credits_at(user, AiOperation::AtsAnalysis, PlanTier::Free, now)
                .await
                .unwrap();
            if check.allowed {
                allowed += 1;
            } else {
                assert_eq!(check.reason, Some(CreditDenial::InsufficientCredits));
                assert_eq!(check.remaining, Some(1));
            }
        }

        assert_eq!(allowed, 3);
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 9);
    }

    #[tokio::test]
    async fn test_lost_increment_race_is_insufficient_credits() {
        let inner = Arc::new(MemoryUsageStore::default());
        let ledger = CreditLedger::new(
            Arc::new(RacingStore {
                inner: inner.clone(),
                competing: 8,
                raced: AtomicBool::new(false),
            }),
            FREE_CREDITS,
        );
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        // Balance check sees 0 used; the competing charge of 8 lands first, so 8 + 3 > 10.
        let check = ledger
            .deduct_credits_at(user, AiOperation::AtsAnalysis, PlanTier::Free, now)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.reason, Some(CreditDenial::InsufficientCredits));
        assert_eq!(check.used, 8);
        assert_eq!(check.remaining, Some(2));

        let stored = inner.get(user).await.unwrap().usage.credits_used;
        assert_eq!(stored, 8);
        assert!(stored <= FREE_CREDITS);
    }

    #[tokio::test]
    async fn test_exact_balance_is_spendable() {
        let (ledger, _) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        for _ in 0..2 {
            let check = ledger
                .deduct_credits_at(user, AiOperation::CoverLetter, PlanTier::Free, now)
                .await
                .unwrap();
            assert!(check.allowed);
        }
        let last = ledger
            .check_credits_at(user, AiOperation::EnhanceBullet, PlanTier::Free, now)
            .await
            .unwrap();
        assert!(!last.allowed);
        assert_eq!(last.used, FREE_CREDITS);
        assert_eq!(last.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_premium_is_unlimited_but_metered() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        for _ in 0..5 {
            let check = ledger
                .deduct_credits_at(user, AiOperation::CoverLetter, PlanTier::Premium, now)
                .await
                .unwrap();
            assert!(check.allowed);
            assert_eq!(check.limit, None);
            assert_eq!(check.remaining, None);
        }
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 25);
    }

    #[tokio::test]
    async fn test_premium_only_operation_rejected_for_free_with_balance() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        let check = ledger
            .deduct_credits_at(user, AiOperation::InterviewPrep, PlanTier::Free, now)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.reason, Some(CreditDenial::PremiumRequired));
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 0);

        let premium = ledger
            .deduct_credits_at(user, AiOperation::InterviewPrep, PlanTier::Premium, now)
            .await
            .unwrap();
        assert!(premium.allowed);
    }

    #[tokio::test]
    async fn test_unknown_operation_touches_no_state() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();

        let check = ledger
            .check_and_deduct_credits(user, "generate_novel", PlanTier::Premium)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.reason, Some(CreditDenial::InvalidOperation));
        assert_eq!(check.reset_date, None);
        assert!(store.get(user).await.is_none());

        let empty = ledger
            .check_and_deduct_credits(user, "", PlanTier::Free)
            .await
            .unwrap();
        assert_eq!(empty.reason, Some(CreditDenial::InvalidOperation));
        assert!(store.get(user).await.is_none());
    }

    #[tokio::test]
    async fn test_named_deduction_charges_known_operation() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();

        let check = ledger
            .check_and_deduct_credits(user, "tailor_resume", PlanTier::Free)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 3);
    }

    #[tokio::test]
    async fn test_reset_after_reset_date() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let may = at(2025, 5, 10);

        for _ in 0..2 {
            ledger
                .deduct_credits_at(user, AiOperation::CoverLetter, PlanTier::Free, may)
                .await
                .unwrap();
        }
        let exhausted = ledger
            .check_credits_at(user, AiOperation::EnhanceBullet, PlanTier::Free, may)
            .await
            .unwrap();
        assert!(!exhausted.allowed);

        let june = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let check = ledger
            .check_credits_at(user, AiOperation::EnhanceBullet, PlanTier::Free, june)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.used, 0);
        assert_eq!(
            check.reset_date,
            Some(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap())
        );

        let account = store.get(user).await.unwrap();
        assert_eq!(account.usage.credits_used, 0);
        assert_eq!(account.usage.last_reset, june);
    }

    #[tokio::test]
    async fn test_no_reset_before_reset_date() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();

        ledger
            .deduct_credits_at(user, AiOperation::CoverLetter, PlanTier::Free, at(2025, 5, 1))
            .await
            .unwrap();
        ledger
            .check_credits_at(user, AiOperation::CoverLetter, PlanTier::Free, at(2025, 5, 31))
            .await
            .unwrap();
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 5);
    }

    #[tokio::test]
    async fn test_refund_restores_balance() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        let now = at(2025, 5, 10);

        ledger
            .deduct_credits_at(user, AiOperation::CoverLetter, PlanTier::Free, now)
            .await
            .unwrap();
        ledger
            .refund_credits(user, AiOperation::CoverLetter)
            .await
            .unwrap();
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 0);

        // Never below zero.
        ledger
            .refund_credits(user, AiOperation::CoverLetter)
            .await
            .unwrap();
        assert_eq!(store.get(user).await.unwrap().usage.credits_used, 0);
    }

    #[tokio::test]
    async fn test_usage_status_reflects_plan() {
        let (ledger, store) = ledger();
        let user = Uuid::new_v4();
        ledger
            .deduct_credits(user, AiOperation::SuggestSkills, PlanTier::Free)
            .await
            .unwrap();

        let status = ledger.usage_status(user).await.unwrap();
        assert_eq!(status.plan, PlanTier::Free);
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining, Some(FREE_CREDITS - 1));

        store.set_plan(user, PlanTier::Premium).await;
        let status = ledger.usage_status(user).await.unwrap();
        assert_eq!(status.limit, None);
    }
}
