//! Claim admission: the checks that decide whether a claim is recorded.

use chrono::Utc;
use drip_common::{Amount, ClaimReceipt, FaucetError, FaucetResult, NewClaim, VerificationStatus};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::context::FaucetContext;
use crate::strategy::{last_week_boundary, CreditStrategy};

/// Admission variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerKind {
    /// Allowance, verification and pending-uniqueness checks.
    Simple,
    /// `Simple` plus the cross-network weekly claim limit.
    Limited,
}

impl ManagerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ManagerKind::Simple => "simple",
            ManagerKind::Limited => "limited",
        }
    }
}

/// Admission manager bound to one (network, user) pair.
#[derive(Debug, Clone)]
pub struct ClaimManager {
    kind: ManagerKind,
    strategy: CreditStrategy,
    ctx: FaucetContext,
}

impl ClaimManager {
    pub fn new(kind: ManagerKind, strategy: CreditStrategy, ctx: FaucetContext) -> Self {
        Self {
            kind,
            strategy,
            ctx,
        }
    }

    pub fn kind(&self) -> ManagerKind {
        self.kind
    }

    pub fn credit_strategy(&self) -> &CreditStrategy {
        &self.strategy
    }

    pub async fn claim(&self, amount: Amount) -> FaucetResult<ClaimReceipt> {
        self.claim_at(amount, Utc::now().timestamp()).await
    }

    /// Admit a claim of `amount` at `now` and record it as Pending.
    ///
    /// Every check and the insert run under the user's lock. A failed check
    /// writes nothing.
    pub async fn claim_at(&self, amount: Amount, now: i64) -> FaucetResult<ClaimReceipt> {
        let started = Instant::now();
        let network = &self.strategy.network().id;
        let user = &self.strategy.user().handle;

        let _guard = self.ctx.locks.acquire(user).await;
        debug!(network = %network, user = %user, "Acquired user lock");

        let result = self.admit(amount, now).await;

        match &result {
            Ok(receipt) => {
                self.ctx.metrics.record_admitted(started.elapsed());
                info!(
                    receipt = receipt.id,
                    network = %network,
                    user = %user,
                    amount = %amount,
                    manager = self.kind.name(),
                    "Claim admitted"
                );
            }
            Err(e) if e.is_rejection() => {
                self.ctx.metrics.record_rejected(e, started.elapsed());
                warn!(
                    network = %network,
                    user = %user,
                    amount = %amount,
                    reason = e.code(),
                    "Claim rejected: {}",
                    e
                );
            }
            Err(e) => {
                self.ctx.metrics.record_rejected(e, started.elapsed());
                warn!(network = %network, user = %user, "Claim failed: {}", e);
            }
        }

        result
    }

    async fn admit(&self, amount: Amount, now: i64) -> FaucetResult<ClaimReceipt> {
        let network = &self.strategy.network().id;
        let user = &self.strategy.user().handle;

        // 1. Allowance
        let balance = self.strategy.balance_at(now).await?;
        if !balance.admits(amount) {
            return Err(FaucetError::InsufficientAllowance {
                requested: amount,
                unclaimed: balance.unclaimed(),
            });
        }

        // 2. Verification
        let status = tokio::time::timeout(
            self.ctx.lookup_timeout,
            self.ctx.identity.get_verification_status(user),
        )
        .await
        .map_err(|_| {
            FaucetError::VerificationLookup(format!(
                "verification lookup for {} timed out after {:?}",
                user, self.ctx.lookup_timeout
            ))
        })??;
        if status != VerificationStatus::Verified {
            return Err(FaucetError::UserNotVerified(user.clone()));
        }

        // 3. One pending claim per network
        if self.ctx.ledger.has_pending(network, user).await? {
            return Err(FaucetError::DuplicatePendingClaim {
                network: network.clone(),
                user: user.clone(),
            });
        }

        // 4. Weekly limit across networks
        if self.kind == ManagerKind::Limited {
            let limit = self.ctx.settings.weekly_chain_claim_limit;
            let count = self
                .ctx
                .ledger
                .count_active_since(user, last_week_boundary(now))
                .await?;
            if count >= u64::from(limit) {
                return Err(FaucetError::WeeklyClaimLimitExceeded { count, limit });
            }
        }

        // The ledger re-checks pending uniqueness inside the write
        self.ctx
            .ledger
            .insert_pending(NewClaim {
                network_id: network.clone(),
                user: user.clone(),
                amount,
                timestamp: now,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentityProvider;
    use crate::strategy::StrategyKind;
    use drip_common::{ClaimStatus, GlobalSettings, Network, User};
    use drip_storage::{MemoryLedger, ReceiptLedger};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    fn manager(kind: ManagerKind, status: VerificationStatus) -> (ClaimManager, Arc<MemoryLedger>) {
        let user = User::new("alice", "0x01").with_status(status);
        let ledger = Arc::new(MemoryLedger::new());
        let identity = Arc::new(StaticIdentityProvider::from_users([&user]));
        let ctx = FaucetContext::new(
            ledger.clone(),
            identity,
            GlobalSettings {
                weekly_chain_claim_limit: 2,
            },
        )
        .unwrap();
        let strategy = CreditStrategy::new(
            StrategyKind::Weekly,
            Network::new("gnosis", 100, 1_000),
            user,
            ledger.clone(),
        );
        (ClaimManager::new(kind, strategy, ctx), ledger)
    }

    #[tokio::test]
    async fn test_claim_records_pending_receipt() {
        let (manager, ledger) = manager(ManagerKind::Limited, VerificationStatus::Verified);
        let receipt = manager.claim_at(400, NOW).await.unwrap();

        assert_eq!(receipt.amount, 400);
        assert_eq!(receipt.timestamp, NOW);
        assert_eq!(receipt.status, ClaimStatus::Pending);
        assert_eq!(ledger.get(receipt.id).await.unwrap(), Some(receipt));
        assert_eq!(manager.ctx.metrics.claims_admitted_total.get(), 1);
        assert!(manager.ctx.locks.is_empty());
    }

    #[tokio::test]
    async fn test_full_cap_admitted_beyond_signed_range() {
        let (manager, ledger) = manager(ManagerKind::Simple, VerificationStatus::Verified);
        let strategy = CreditStrategy::new(
            StrategyKind::Lifetime,
            Network::new("gnosis", 100, u128::MAX),
            manager.credit_strategy().user().clone(),
            ledger.clone(),
        );
        let manager = ClaimManager::new(ManagerKind::Simple, strategy, manager.ctx.clone());

        let receipt = manager.claim_at(u128::MAX, NOW).await.unwrap();
        assert_eq!(receipt.amount, u128::MAX);
        ledger
            .update_status(receipt.id, ClaimStatus::Verified, None, NOW)
            .await
            .unwrap();

        let err = manager.claim_at(1, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            FaucetError::InsufficientAllowance { unclaimed: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_allowance_checked_before_verification() {
        let (manager, ledger) = manager(ManagerKind::Simple, VerificationStatus::Pending);

        let err = manager.claim_at(1_001, NOW).await.unwrap_err();
        assert!(matches!(err, FaucetError::InsufficientAllowance { .. }));

        let err = manager.claim_at(1_000, NOW).await.unwrap_err();
        assert!(matches!(err, FaucetError::UserNotVerified(_)));
        assert!(ledger.is_empty().await);
        assert_eq!(manager.ctx.metrics.rejected("USER_NOT_VERIFIED"), 1);
    }

    #[tokio::test]
    async fn test_simple_ignores_weekly_limit() {
        let (simple, ledger) = manager(ManagerKind::Simple, VerificationStatus::Verified);
        for _ in 0..3 {
            let receipt = simple.claim_at(10, NOW).await.unwrap();
            ledger
                .update_status(receipt.id, ClaimStatus::Verified, None, NOW)
                .await
                .unwrap();
        }
        assert_eq!(ledger.len().await, 3);
    }

    #[tokio::test]
    async fn test_limited_enforces_weekly_limit() {
        let (limited, ledger) = manager(ManagerKind::Limited, VerificationStatus::Verified);
        for _ in 0..2 {
            let receipt = limited.claim_at(10, NOW).await.unwrap();
            ledger
                .update_status(receipt.id, ClaimStatus::Verified, None, NOW)
                .await
                .unwrap();
        }
        let err = limited.claim_at(10, NOW).await.unwrap_err();
        assert!(matches!(
            err,
            FaucetError::WeeklyClaimLimitExceeded { count: 2, limit: 2 }
        ));

        // The window resets at the next boundary
        let next_week = last_week_boundary(NOW) + drip_common::types::SECONDS_PER_WEEK;
        assert!(limited.claim_at(10, next_week).await.is_ok());
    }
}
