//! Shared collaborators handed to factories and managers.

use drip_common::{FaucetError, FaucetResult, GlobalSettings};
use drip_storage::ReceiptLedger;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::identity::IdentityProvider;
use crate::locks::UserLocks;
use crate::metrics::FaucetMetrics;
use crate::registry::VerifiedUserRegistry;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a claim needs besides the (network, user) pair. Cheap to clone.
#[derive(Clone)]
pub struct FaucetContext {
    pub ledger: Arc<dyn ReceiptLedger>,
    pub identity: Arc<dyn IdentityProvider>,
    pub registry: Option<Arc<dyn VerifiedUserRegistry>>,
    pub settings: GlobalSettings,
    pub locks: Arc<UserLocks>,
    pub metrics: Arc<FaucetMetrics>,
    /// Bound on each identity or registry lookup made while a user lock is held
    pub lookup_timeout: Duration,
}

impl FaucetContext {
    pub fn new(
        ledger: Arc<dyn ReceiptLedger>,
        identity: Arc<dyn IdentityProvider>,
        settings: GlobalSettings,
    ) -> FaucetResult<Self> {
        let metrics = FaucetMetrics::new().map_err(|e| FaucetError::Internal(e.to_string()))?;
        Ok(Self {
            ledger,
            identity,
            registry: None,
            settings,
            locks: Arc::new(UserLocks::new()),
            metrics: Arc::new(metrics),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        })
    }

    pub fn with_registry(mut self, registry: Arc<dyn VerifiedUserRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

impl fmt::Debug for FaucetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaucetContext")
            .field("settings", &self.settings)
            .field("registry", &self.registry.is_some())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}
