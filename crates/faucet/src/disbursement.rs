//! Hand-off to the external disbursement processor.
//!
//! The processor polls for Pending receipts, sends the funds, then resolves
//! each receipt to Verified (with the transaction hash) or Rejected.

use chrono::Utc;
use drip_common::{ClaimReceipt, ClaimStatus, FaucetResult, ReceiptId};
use drip_storage::ReceiptLedger;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::metrics::FaucetMetrics;

#[derive(Clone)]
pub struct DisbursementQueue {
    ledger: Arc<dyn ReceiptLedger>,
    metrics: Arc<FaucetMetrics>,
}

impl DisbursementQueue {
    pub fn new(ledger: Arc<dyn ReceiptLedger>, metrics: Arc<FaucetMetrics>) -> Self {
        Self { ledger, metrics }
    }

    /// Pending receipts at least `age` old, oldest first.
    pub async fn pending_older_than(&self, age: Duration) -> FaucetResult<Vec<ClaimReceipt>> {
        let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
        self.pending_before(Utc::now().timestamp().saturating_sub(age))
            .await
    }

    /// Pending receipts created at or before `cutoff`.
    pub async fn pending_before(&self, cutoff: i64) -> FaucetResult<Vec<ClaimReceipt>> {
        self.ledger.pending_older_than(cutoff).await
    }

    /// Move a Pending receipt to Verified or Rejected. Any other transition
    /// is `InvalidStatusTransition`.
    pub async fn resolve(
        &self,
        id: ReceiptId,
        status: ClaimStatus,
        note: Option<String>,
    ) -> FaucetResult<ClaimReceipt> {
        let receipt = self
            .ledger
            .update_status(id, status, note, Utc::now().timestamp())
            .await?;
        self.metrics.record_resolved(status);
        info!(
            receipt = id,
            network = %receipt.network_id,
            user = %receipt.user,
            status = %status,
            "Receipt resolved"
        );
        Ok(receipt)
    }

    pub async fn mark_verified(&self, id: ReceiptId, tx_hash: String) -> FaucetResult<ClaimReceipt> {
        self.resolve(id, ClaimStatus::Verified, Some(tx_hash)).await
    }

    pub async fn mark_rejected(&self, id: ReceiptId, reason: String) -> FaucetResult<ClaimReceipt> {
        self.resolve(id, ClaimStatus::Rejected, Some(reason)).await
    }
}
