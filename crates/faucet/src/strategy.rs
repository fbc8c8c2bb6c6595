//! Credit accounting: how much of a network's cap a user has claimed and
//! how much remains.

use chrono::Utc;
use drip_common::types::SECONDS_PER_WEEK;
use drip_common::{Amount, FaucetError, FaucetResult, Network, SignedAmount, User};
use drip_storage::ReceiptLedger;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::registry::VerifiedUserRegistry;

/// Offset of the first weekly boundary from the unix epoch (Monday
/// 1970-01-05 00:00 UTC).
pub const WEEK_ANCHOR: i64 = 4 * 86_400;

/// Start of the current weekly window for `now` (unix seconds).
///
/// Anchored to [`WEEK_ANCHOR`] rather than to calendar weeks:
/// `c = WEEK_ANCHOR + floor(now / week) * week`, stepped back one week when
/// it lands after `now`.
pub fn last_week_boundary(now: i64) -> i64 {
    let weeks = now.div_euclid(SECONDS_PER_WEEK);
    let mut boundary = WEEK_ANCHOR + weeks * SECONDS_PER_WEEK;
    if boundary > now {
        boundary -= SECONDS_PER_WEEK;
    }
    boundary
}

/// Start of the window before the current one.
pub fn second_last_week_boundary(now: i64) -> i64 {
    last_week_boundary(now) - SECONDS_PER_WEEK
}

/// Cap, claimed and unclaimed read from one cap lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub cap: Amount,
    pub claimed: Amount,
}

impl Balance {
    /// Cap minus claimed, saturating at the `SignedAmount` bounds.
    pub fn unclaimed(&self) -> SignedAmount {
        if self.cap >= self.claimed {
            SignedAmount::try_from(self.cap - self.claimed).unwrap_or(SignedAmount::MAX)
        } else {
            SignedAmount::try_from(self.claimed - self.cap)
                .map(|over| -over)
                .unwrap_or(SignedAmount::MIN)
        }
    }

    /// Whether `amount` fits the remaining allowance. Exact for every `u128`.
    pub fn admits(&self, amount: Amount) -> bool {
        self.claimed
            .checked_add(amount)
            .map_or(false, |total| total <= self.cap)
    }
}

/// Accounting policy variants
#[derive(Clone)]
pub enum StrategyKind {
    /// Every verified receipt counts against the cap.
    Lifetime,
    /// Only verified receipts since the weekly boundary count.
    Weekly,
    /// Weekly accounting with a raised cap for registry-verified users.
    RegistryOverride {
        elevated_cap: Amount,
        registry: Arc<dyn VerifiedUserRegistry>,
        timeout: Duration,
    },
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Lifetime => "lifetime",
            StrategyKind::Weekly => "weekly",
            StrategyKind::RegistryOverride { .. } => "registry_override",
        }
    }
}

impl fmt::Debug for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::RegistryOverride {
                elevated_cap,
                timeout,
                ..
            } => f
                .debug_struct("RegistryOverride")
                .field("elevated_cap", elevated_cap)
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}

/// Allowance calculator for one (network, user) pair.
#[derive(Clone)]
pub struct CreditStrategy {
    kind: StrategyKind,
    network: Network,
    user: User,
    ledger: Arc<dyn ReceiptLedger>,
}

impl CreditStrategy {
    pub fn new(
        kind: StrategyKind,
        network: Network,
        user: User,
        ledger: Arc<dyn ReceiptLedger>,
    ) -> Self {
        Self {
            kind,
            network,
            user,
            ledger,
        }
    }

    pub fn kind(&self) -> &StrategyKind {
        &self.kind
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// First timestamp counted by this strategy at `now`; `None` counts all.
    pub fn window_start(&self, now: i64) -> Option<i64> {
        match self.kind {
            StrategyKind::Lifetime => None,
            StrategyKind::Weekly | StrategyKind::RegistryOverride { .. } => {
                Some(last_week_boundary(now))
            }
        }
    }

    pub async fn get_claimed(&self) -> FaucetResult<Amount> {
        self.get_claimed_at(Utc::now().timestamp()).await
    }

    /// Sum of verified receipts inside the window at `now`.
    pub async fn get_claimed_at(&self, now: i64) -> FaucetResult<Amount> {
        self.ledger
            .sum_verified(&self.network.id, &self.user.handle, self.window_start(now))
            .await
    }

    pub async fn get_unclaimed(&self) -> FaucetResult<SignedAmount> {
        self.get_unclaimed_at(Utc::now().timestamp()).await
    }

    /// Cap minus claimed. Not clamped: negative once claims exceed the cap.
    pub async fn get_unclaimed_at(&self, now: i64) -> FaucetResult<SignedAmount> {
        Ok(self.balance_at(now).await?.unclaimed())
    }

    /// Cap and claimed amount at `now`, with a single cap lookup.
    pub async fn balance_at(&self, now: i64) -> FaucetResult<Balance> {
        let cap = self.cap().await?;
        let claimed = self.get_claimed_at(now).await?;
        let balance = Balance { cap, claimed };

        debug!(
            network = %self.network.id,
            user = %self.user.handle,
            strategy = self.kind.name(),
            cap = %cap,
            claimed = %claimed,
            unclaimed = %balance.unclaimed(),
            "Computed allowance"
        );
        Ok(balance)
    }

    /// Cap in force for this user.
    pub async fn cap(&self) -> FaucetResult<Amount> {
        match &self.kind {
            StrategyKind::Lifetime | StrategyKind::Weekly => Ok(self.network.max_claim_amount),
            StrategyKind::RegistryOverride {
                elevated_cap,
                registry,
                timeout,
            } => {
                let verified =
                    tokio::time::timeout(*timeout, registry.is_verified_user(&self.user.handle))
                        .await
                        .map_err(|_| {
                            FaucetError::RegistryLookup(format!(
                                "registry lookup for {} timed out after {:?}",
                                self.user.handle, timeout
                            ))
                        })??;

                if verified {
                    Ok(*elevated_cap)
                } else {
                    Ok(self.network.max_claim_amount)
                }
            }
        }
    }
}

impl fmt::Debug for CreditStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditStrategy")
            .field("kind", &self.kind)
            .field("network", &self.network.id)
            .field("user", &self.user.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticUserRegistry;
    use async_trait::async_trait;
    use drip_common::{ClaimReceipt, ClaimStatus, NetworkId, UserHandle};
    use drip_storage::MemoryLedger;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_week_boundary_vectors() {
        assert_eq!(last_week_boundary(0), -259_200);
        assert_eq!(last_week_boundary(345_599), -259_200);
        assert_eq!(last_week_boundary(345_600), 345_600);
        assert_eq!(last_week_boundary(604_800 + 1), 345_600);
        assert_eq!(last_week_boundary(1_000_000), 950_400);
    }

    #[test]
    fn test_week_boundary_properties() {
        for now in [345_600i64, 999_999, 1_234_567_890, NOW, NOW + 3 * 86_400] {
            let boundary = last_week_boundary(now);
            assert!(boundary <= now);
            assert!(now - boundary < SECONDS_PER_WEEK);
            assert_eq!((boundary - WEEK_ANCHOR).rem_euclid(SECONDS_PER_WEEK), 0);
            assert_eq!(second_last_week_boundary(now), boundary - SECONDS_PER_WEEK);
        }
    }

    fn receipt(network: &str, user: &str, amount: Amount, timestamp: i64, status: ClaimStatus) -> ClaimReceipt {
        ClaimReceipt {
            id: 0,
            network_id: NetworkId::from(network),
            user: UserHandle::from(user),
            amount,
            timestamp,
            status,
            note: None,
            resolved_at: None,
        }
    }

    async fn seeded_ledger() -> Arc<MemoryLedger> {
        let boundary = last_week_boundary(NOW);
        let ledger = Arc::new(MemoryLedger::new());
        // Last week: counts for lifetime only
        ledger.import(receipt("gnosis", "alice", 300, boundary - 10, ClaimStatus::Verified)).await;
        // This week
        ledger.import(receipt("gnosis", "alice", 200, boundary, ClaimStatus::Verified)).await;
        ledger.import(receipt("gnosis", "alice", 50, NOW - 5, ClaimStatus::Rejected)).await;
        ledger.import(receipt("gnosis", "alice", 70, NOW - 1, ClaimStatus::Pending)).await;
        // Other network and user
        ledger.import(receipt("fuse", "alice", 900, NOW - 1, ClaimStatus::Verified)).await;
        ledger.import(receipt("gnosis", "bob", 900, NOW - 1, ClaimStatus::Verified)).await;
        ledger
    }

    fn strategy(kind: StrategyKind, ledger: Arc<MemoryLedger>) -> CreditStrategy {
        CreditStrategy::new(
            kind,
            Network::new("gnosis", 100, 1_000),
            User::new("alice", "0x00000000000000000000000000000000000000aa"),
            ledger,
        )
    }

    #[tokio::test]
    async fn test_lifetime_counts_all_verified() {
        let s = strategy(StrategyKind::Lifetime, seeded_ledger().await);
        assert_eq!(s.get_claimed_at(NOW).await.unwrap(), 500);
        assert_eq!(s.get_unclaimed_at(NOW).await.unwrap(), 500);
        assert_eq!(s.window_start(NOW), None);
    }

    #[tokio::test]
    async fn test_weekly_counts_current_window() {
        let s = strategy(StrategyKind::Weekly, seeded_ledger().await);
        assert_eq!(s.get_claimed_at(NOW).await.unwrap(), 200);
        assert_eq!(s.get_unclaimed_at(NOW).await.unwrap(), 800);
        // Idempotent without new verified receipts
        assert_eq!(s.get_claimed_at(NOW).await.unwrap(), 200);
        // Next week the window is empty again
        let next_week = last_week_boundary(NOW) + SECONDS_PER_WEEK;
        assert_eq!(s.get_claimed_at(next_week).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unclaimed_can_go_negative() {
        let ledger = seeded_ledger().await;
        ledger.import(receipt("gnosis", "alice", 1_100, NOW - 2, ClaimStatus::Verified)).await;
        let s = strategy(StrategyKind::Weekly, ledger);
        assert_eq!(s.get_unclaimed_at(NOW).await.unwrap(), -300);
    }

    #[test]
    fn test_balance_beyond_signed_range() {
        let huge = Balance {
            cap: u128::MAX,
            claimed: 0,
        };
        assert!(huge.admits(u128::MAX));
        assert_eq!(huge.unclaimed(), SignedAmount::MAX);

        let over = Balance {
            cap: 10,
            claimed: u128::MAX,
        };
        assert!(!over.admits(0));
        assert_eq!(over.unclaimed(), SignedAmount::MIN);

        let exact = Balance {
            cap: 1_000,
            claimed: 400,
        };
        assert!(exact.admits(600));
        assert!(!exact.admits(601));
        assert!(!exact.admits(u128::MAX));
    }

    #[tokio::test]
    async fn test_registry_override_raises_cap() {
        let registry = Arc::new(StaticUserRegistry::new());
        let kind = StrategyKind::RegistryOverride {
            elevated_cap: 5_000,
            registry: registry.clone(),
            timeout: Duration::from_secs(1),
        };
        let s = strategy(kind, seeded_ledger().await);
        assert_eq!(s.get_unclaimed_at(NOW).await.unwrap(), 800);

        registry.set_verified(UserHandle::from("alice"), true);
        assert_eq!(s.get_unclaimed_at(NOW).await.unwrap(), 4_800);
    }

    struct FailingRegistry;

    #[async_trait]
    impl VerifiedUserRegistry for FailingRegistry {
        async fn is_verified_user(&self, _user: &UserHandle) -> FaucetResult<bool> {
            Err(FaucetError::RegistryLookup("connection refused".to_string()))
        }
    }

    struct HangingRegistry;

    #[async_trait]
    impl VerifiedUserRegistry for HangingRegistry {
        async fn is_verified_user(&self, _user: &UserHandle) -> FaucetResult<bool> {
            std::future::pending::<()>().await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_registry_failure_is_not_unverified() {
        let kind = StrategyKind::RegistryOverride {
            elevated_cap: 5_000,
            registry: Arc::new(FailingRegistry),
            timeout: Duration::from_secs(1),
        };
        let s = strategy(kind, seeded_ledger().await);
        let err = s.get_unclaimed_at(NOW).await.unwrap_err();
        assert!(matches!(err, FaucetError::RegistryLookup(_)));
    }

    #[tokio::test]
    async fn test_registry_timeout_surfaces() {
        let kind = StrategyKind::RegistryOverride {
            elevated_cap: 5_000,
            registry: Arc::new(HangingRegistry),
            timeout: Duration::from_millis(20),
        };
        let s = strategy(kind, seeded_ledger().await);
        let err = s.get_unclaimed_at(NOW).await.unwrap_err();
        assert!(matches!(err, FaucetError::RegistryLookup(_)));
    }
}
