//! Resolve strategies and managers from network configuration.

use drip_common::{CreditPolicy, FaucetError, FaucetResult, Network, User};

use crate::context::FaucetContext;
use crate::manager::{ClaimManager, ManagerKind};
use crate::strategy::{CreditStrategy, StrategyKind};

pub struct CreditStrategyFactory<'a> {
    ctx: &'a FaucetContext,
    network: &'a Network,
    user: &'a User,
}

impl<'a> CreditStrategyFactory<'a> {
    pub fn new(ctx: &'a FaucetContext, network: &'a Network, user: &'a User) -> Self {
        Self { ctx, network, user }
    }

    /// Strategy kind for the network's configured policy.
    pub fn get_strategy_kind(&self) -> FaucetResult<StrategyKind> {
        match self.network.policy {
            CreditPolicy::Lifetime => Ok(StrategyKind::Lifetime),
            CreditPolicy::Weekly => Ok(StrategyKind::Weekly),
            CreditPolicy::RegistryOverride => {
                let elevated_cap = self.network.elevated_claim_amount.ok_or_else(|| {
                    FaucetError::Configuration(format!(
                        "network {} uses registry_override without elevated_claim_amount",
                        self.network.id
                    ))
                })?;
                let registry = self.ctx.registry.clone().ok_or_else(|| {
                    FaucetError::Configuration(format!(
                        "network {} uses registry_override but no registry is configured",
                        self.network.id
                    ))
                })?;
                Ok(StrategyKind::RegistryOverride {
                    elevated_cap,
                    registry,
                    timeout: self.ctx.lookup_timeout,
                })
            }
        }
    }

    pub fn get_strategy(&self) -> FaucetResult<CreditStrategy> {
        Ok(CreditStrategy::new(
            self.get_strategy_kind()?,
            self.network.clone(),
            self.user.clone(),
            self.ctx.ledger.clone(),
        ))
    }
}

pub struct ClaimManagerFactory<'a> {
    ctx: &'a FaucetContext,
    network: &'a Network,
    user: &'a User,
}

impl<'a> ClaimManagerFactory<'a> {
    pub fn new(ctx: &'a FaucetContext, network: &'a Network, user: &'a User) -> Self {
        Self { ctx, network, user }
    }

    /// Every network admits through the weekly-limited manager.
    pub fn get_manager_kind(&self) -> ManagerKind {
        ManagerKind::Limited
    }

    pub fn get_manager(&self) -> FaucetResult<ClaimManager> {
        let strategy = CreditStrategyFactory::new(self.ctx, self.network, self.user).get_strategy()?;
        Ok(ClaimManager::new(
            self.get_manager_kind(),
            strategy,
            self.ctx.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentityProvider;
    use crate::registry::StaticUserRegistry;
    use drip_common::GlobalSettings;
    use drip_storage::MemoryLedger;
    use std::sync::Arc;

    fn context() -> FaucetContext {
        FaucetContext::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(StaticIdentityProvider::new()),
            GlobalSettings::default(),
        )
        .unwrap()
    }

    fn user() -> User {
        User::new("alice", "0x01")
    }

    #[test]
    fn test_policy_selects_strategy() {
        let ctx = context();
        let user = user();

        let weekly = Network::new("gnosis", 100, 1_000);
        let strategy = CreditStrategyFactory::new(&ctx, &weekly, &user)
            .get_strategy()
            .unwrap();
        assert_eq!(strategy.kind().name(), "weekly");

        let lifetime = Network::new("fuse", 122, 1_000).with_policy(CreditPolicy::Lifetime);
        let strategy = CreditStrategyFactory::new(&ctx, &lifetime, &user)
            .get_strategy()
            .unwrap();
        assert_eq!(strategy.kind().name(), "lifetime");
    }

    #[test]
    fn test_registry_override_requires_collaborators() {
        let user = user();
        let network = Network::new("celo", 42220, 1_000).with_policy(CreditPolicy::RegistryOverride);

        let ctx = context();
        let err = ClaimManagerFactory::new(&ctx, &network, &user)
            .get_manager()
            .unwrap_err();
        assert!(matches!(err, FaucetError::Configuration(_)));

        let network = network.with_elevated_claim_amount(5_000);
        let err = ClaimManagerFactory::new(&ctx, &network, &user)
            .get_manager()
            .unwrap_err();
        assert!(matches!(err, FaucetError::Configuration(_)));

        let ctx = context().with_registry(Arc::new(StaticUserRegistry::new()));
        let manager = ClaimManagerFactory::new(&ctx, &network, &user)
            .get_manager()
            .unwrap();
        assert_eq!(manager.kind(), ManagerKind::Limited);
        assert_eq!(manager.credit_strategy().kind().name(), "registry_override");
    }
}
