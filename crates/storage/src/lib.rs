//! Receipt ledger: the append-only record of claim attempts.
//!
//! Two backends implement [`ReceiptLedger`]: [`MemoryLedger`] for tests and
//! embedded use, [`SledLedger`] for durable storage. Both enforce at most one
//! Pending receipt per (network, user) inside the insert itself.

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use drip_common::{
    Amount, ClaimReceipt, ClaimStatus, FaucetError, FaucetResult, NetworkId, NewClaim, ReceiptId,
    UserHandle,
};
use serde::{Deserialize, Serialize};

pub use memory::MemoryLedger;
pub use self::sled::SledLedger;

#[async_trait]
pub trait ReceiptLedger: Send + Sync {
    /// Append a Pending receipt. Fails with `DuplicatePendingClaim` when the
    /// pair already holds one; nothing is written in that case.
    async fn insert_pending(&self, claim: NewClaim) -> FaucetResult<ClaimReceipt>;

    async fn get(&self, id: ReceiptId) -> FaucetResult<Option<ClaimReceipt>>;

    /// Sum of Verified amounts for the pair, optionally only receipts with
    /// `timestamp >= since`.
    async fn sum_verified(
        &self,
        network: &NetworkId,
        user: &UserHandle,
        since: Option<i64>,
    ) -> FaucetResult<Amount>;

    async fn has_pending(&self, network: &NetworkId, user: &UserHandle) -> FaucetResult<bool>;

    /// Pending+Verified receipts of `user` on every network with `timestamp >= since`.
    async fn count_active_since(&self, user: &UserHandle, since: i64) -> FaucetResult<u64>;

    /// Pending receipts created at or before `cutoff`, oldest first.
    async fn pending_older_than(&self, cutoff: i64) -> FaucetResult<Vec<ClaimReceipt>>;

    /// Resolve a Pending receipt to Verified or Rejected.
    async fn update_status(
        &self,
        id: ReceiptId,
        status: ClaimStatus,
        note: Option<String>,
        resolved_at: i64,
    ) -> FaucetResult<ClaimReceipt>;

    /// Receipts of the pair, newest first.
    async fn receipts_for(
        &self,
        network: &NetworkId,
        user: &UserHandle,
    ) -> FaucetResult<Vec<ClaimReceipt>>;

    async fn stats(&self) -> FaucetResult<LedgerStats>;
}

/// Ledger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_receipts: u64,
    pub pending: u64,
    pub verified: u64,
    pub rejected: u64,
    pub total_verified_amount: Amount,
    pub unique_users: u64,
}

impl LedgerStats {
    fn record(&mut self, receipt: &ClaimReceipt) {
        self.total_receipts += 1;
        match receipt.status {
            ClaimStatus::Pending => self.pending += 1,
            ClaimStatus::Verified => {
                self.verified += 1;
                self.total_verified_amount =
                    self.total_verified_amount.saturating_add(receipt.amount);
            }
            ClaimStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Applies a resolution to a receipt. Only Pending receipts move, and only to
/// a final status.
fn resolve_receipt(
    receipt: &mut ClaimReceipt,
    status: ClaimStatus,
    note: Option<String>,
    resolved_at: i64,
) -> FaucetResult<()> {
    if !receipt.is_pending() || !status.is_final() {
        return Err(FaucetError::InvalidStatusTransition {
            id: receipt.id,
            from: receipt.status,
            to: status,
        });
    }
    receipt.status = status;
    receipt.note = note;
    receipt.resolved_at = Some(resolved_at);
    Ok(())
}

fn verified_sum<'a>(
    receipts: impl Iterator<Item = &'a ClaimReceipt>,
    since: Option<i64>,
) -> Amount {
    receipts
        .filter(|r| r.status == ClaimStatus::Verified)
        .filter(|r| since.map_or(true, |s| r.timestamp >= s))
        .fold(0u128, |acc, r| acc.saturating_add(r.amount))
}
