//! Faucet service: the entry point callers use to claim and inspect allowances.

use chrono::Utc;
use drip_common::types::SECONDS_PER_WEEK;
use drip_common::{
    Amount, ClaimReceipt, FaucetError, FaucetResult, Network, NetworkId, SignedAmount, User,
    UserHandle,
};
use drip_storage::{LedgerStats, ReceiptLedger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::FaucetConfig;
use crate::context::FaucetContext;
use crate::disbursement::DisbursementQueue;
use crate::factory::{ClaimManagerFactory, CreditStrategyFactory};
use crate::identity::{HttpIdentityProvider, IdentityProvider, StaticIdentityProvider};
use crate::manager::ClaimManager;
use crate::registry::RpcUserRegistry;

/// Allowance snapshot for one (network, user) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub network: NetworkId,
    pub user: UserHandle,
    pub strategy: String,
    pub cap: Amount,
    pub claimed: Amount,
    pub unclaimed: SignedAmount,
    /// Start of the accounting window, absent for lifetime accounting
    pub window_start: Option<i64>,
    /// When the window next resets
    pub next_reset: Option<i64>,
}

/// Faucet service
pub struct FaucetService {
    networks: BTreeMap<NetworkId, Network>,
    ctx: FaucetContext,
}

impl FaucetService {
    pub fn new(networks: Vec<Network>, ctx: FaucetContext) -> Self {
        let networks = networks
            .into_iter()
            .map(|network| (network.id.clone(), network))
            .collect();
        Self { networks, ctx }
    }

    /// Build collaborators from configuration around an opened ledger
    pub fn from_config(config: &FaucetConfig, ledger: Arc<dyn ReceiptLedger>) -> FaucetResult<Self> {
        let networks = config.networks()?;
        let timeout = config.lookup_timeout();

        let identity: Arc<dyn IdentityProvider> = match &config.identity.endpoint {
            Some(endpoint) => Arc::new(HttpIdentityProvider::new(
                endpoint.clone(),
                config.identity.app.clone(),
                timeout,
            )?),
            None => Arc::new(StaticIdentityProvider::from_users(&config.identity.users)),
        };

        let mut ctx =
            FaucetContext::new(ledger, identity, config.settings)?.with_lookup_timeout(timeout);
        if let Some(registry) = &config.registry {
            ctx = ctx.with_registry(Arc::new(RpcUserRegistry::new(
                registry.rpc_url.clone(),
                registry.contract_address.clone(),
                timeout,
            )?));
        }

        info!(
            "Faucet configured with {} networks, weekly claim limit {}",
            networks.len(),
            config.settings.weekly_chain_claim_limit
        );
        Ok(Self::new(networks, ctx))
    }

    pub fn context(&self) -> &FaucetContext {
        &self.ctx
    }

    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn network(&self, id: &NetworkId) -> FaucetResult<&Network> {
        self.networks
            .get(id)
            .ok_or_else(|| FaucetError::UnknownNetwork(id.clone()))
    }

    pub fn manager(&self, network_id: &NetworkId, user: &User) -> FaucetResult<ClaimManager> {
        let network = self.network(network_id)?;
        ClaimManagerFactory::new(&self.ctx, network, user).get_manager()
    }

    pub async fn claim(
        &self,
        network_id: &NetworkId,
        user: &User,
        amount: Amount,
    ) -> FaucetResult<ClaimReceipt> {
        self.manager(network_id, user)?.claim(amount).await
    }

    pub async fn allowance(&self, network_id: &NetworkId, user: &User) -> FaucetResult<Allowance> {
        self.allowance_at(network_id, user, Utc::now().timestamp())
            .await
    }

    pub async fn allowance_at(
        &self,
        network_id: &NetworkId,
        user: &User,
        now: i64,
    ) -> FaucetResult<Allowance> {
        let network = self.network(network_id)?;
        let strategy = CreditStrategyFactory::new(&self.ctx, network, user).get_strategy()?;

        let balance = strategy.balance_at(now).await?;
        let window_start = strategy.window_start(now);

        Ok(Allowance {
            network: network.id.clone(),
            user: user.handle.clone(),
            strategy: strategy.kind().name().to_string(),
            cap: balance.cap,
            claimed: balance.claimed,
            unclaimed: balance.unclaimed(),
            window_start,
            next_reset: window_start.map(|start| start + SECONDS_PER_WEEK),
        })
    }

    /// Receipts of the pair, newest first.
    pub async fn history(
        &self,
        network_id: &NetworkId,
        user: &UserHandle,
    ) -> FaucetResult<Vec<ClaimReceipt>> {
        self.network(network_id)?;
        self.ctx.ledger.receipts_for(network_id, user).await
    }

    pub fn disbursement(&self) -> DisbursementQueue {
        DisbursementQueue::new(self.ctx.ledger.clone(), self.ctx.metrics.clone())
    }

    pub async fn statistics(&self) -> FaucetResult<LedgerStats> {
        self.ctx.ledger.stats().await
    }

    /// Prometheus text exposition of the faucet metrics
    pub fn metrics(&self) -> FaucetResult<String> {
        self.ctx.metrics.gather()
    }
}
