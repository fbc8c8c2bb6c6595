//! In-memory ledger, used by tests and single-process deployments.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::{resolve_receipt, verified_sum, LedgerStats, ReceiptLedger};
use drip_common::{
    Amount, ClaimReceipt, ClaimStatus, FaucetError, FaucetResult, NetworkId, NewClaim, ReceiptId,
    UserHandle,
};

#[derive(Debug, Default)]
struct LedgerState {
    receipts: BTreeMap<ReceiptId, ClaimReceipt>,
    /// (network, user) -> id of its Pending receipt
    pending: HashMap<(NetworkId, UserHandle), ReceiptId>,
    next_id: ReceiptId,
}

/// Thread-safe in-memory ledger. One lock guards receipts and the pending
/// index so check-and-insert is a single critical section.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a receipt as-is, bypassing admission. Used to seed history.
    pub async fn import(&self, mut receipt: ClaimReceipt) -> ReceiptId {
        let mut state = self.state.write().await;
        state.next_id += 1;
        receipt.id = state.next_id;
        if receipt.is_pending() {
            state
                .pending
                .insert((receipt.network_id.clone(), receipt.user.clone()), receipt.id);
        }
        let id = receipt.id;
        state.receipts.insert(id, receipt);
        id
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.receipts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReceiptLedger for MemoryLedger {
    async fn insert_pending(&self, claim: NewClaim) -> FaucetResult<ClaimReceipt> {
        let mut state = self.state.write().await;
        let key = (claim.network_id.clone(), claim.user.clone());
        if state.pending.contains_key(&key) {
            return Err(FaucetError::DuplicatePendingClaim {
                network: key.0,
                user: key.1,
            });
        }

        state.next_id += 1;
        let receipt = ClaimReceipt::pending(state.next_id, claim);
        state.pending.insert(key, receipt.id);
        state.receipts.insert(receipt.id, receipt.clone());

        debug!("Recorded pending receipt {} for {}", receipt.id, receipt.user);
        Ok(receipt)
    }

    async fn get(&self, id: ReceiptId) -> FaucetResult<Option<ClaimReceipt>> {
        Ok(self.state.read().await.receipts.get(&id).cloned())
    }

    async fn sum_verified(
        &self,
        network: &NetworkId,
        user: &UserHandle,
        since: Option<i64>,
    ) -> FaucetResult<Amount> {
        let state = self.state.read().await;
        let receipts = state
            .receipts
            .values()
            .filter(|r| &r.network_id == network && &r.user == user);
        Ok(verified_sum(receipts, since))
    }

    async fn has_pending(&self, network: &NetworkId, user: &UserHandle) -> FaucetResult<bool> {
        let state = self.state.read().await;
        Ok(state.pending.contains_key(&(network.clone(), user.clone())))
    }

    async fn count_active_since(&self, user: &UserHandle, since: i64) -> FaucetResult<u64> {
        let state = self.state.read().await;
        let count = state
            .receipts
            .values()
            .filter(|r| &r.user == user && r.status.is_active() && r.timestamp >= since)
            .count();
        Ok(count as u64)
    }

    async fn pending_older_than(&self, cutoff: i64) -> FaucetResult<Vec<ClaimReceipt>> {
        let state = self.state.read().await;
        let mut pending: Vec<ClaimReceipt> = state
            .pending
            .values()
            .filter_map(|id| state.receipts.get(id))
            .filter(|r| r.timestamp <= cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.timestamp, r.id));
        Ok(pending)
    }

    async fn update_status(
        &self,
        id: ReceiptId,
        status: ClaimStatus,
        note: Option<String>,
        resolved_at: i64,
    ) -> FaucetResult<ClaimReceipt> {
        let mut state = self.state.write().await;
        let receipt = state
            .receipts
            .get_mut(&id)
            .ok_or(FaucetError::ReceiptNotFound(id))?;
        resolve_receipt(receipt, status, note, resolved_at)?;

        let resolved = receipt.clone();
        state
            .pending
            .remove(&(resolved.network_id.clone(), resolved.user.clone()));

        debug!("Receipt {} resolved as {}", id, status);
        Ok(resolved)
    }

    async fn receipts_for(
        &self,
        network: &NetworkId,
        user: &UserHandle,
    ) -> FaucetResult<Vec<ClaimReceipt>> {
        let state = self.state.read().await;
        let mut records: Vec<ClaimReceipt> = state
            .receipts
            .values()
            .filter(|r| &r.network_id == network && &r.user == user)
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(records)
    }

    async fn stats(&self) -> FaucetResult<LedgerStats> {
        let state = self.state.read().await;
        let mut stats = LedgerStats::default();
        let mut users = HashSet::new();
        for receipt in state.receipts.values() {
            stats.record(receipt);
            users.insert(&receipt.user);
        }
        stats.unique_users = users.len() as u64;
        Ok(stats)
    }
}
