//! Durable ledger on sled.
//!
//! Trees:
//! - `receipts`: id (big-endian) -> bincode `ClaimReceipt`
//! - `pending`:  `len network len user` -> id of the pair's Pending receipt
//! - `by_user`:  `len user id` -> empty, for per-user scans
//!
//! Key components are prefixed with their u32 big-endian length, so no
//! handle's keys can fall under another handle's scan prefix.
//!
//! Inserts and status updates run as multi-tree transactions, so the pending
//! index can never disagree with the receipts it points at.

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{resolve_receipt, verified_sum, LedgerStats, ReceiptLedger};
use drip_common::{
    Amount, ClaimReceipt, ClaimStatus, FaucetError, FaucetResult, NetworkId, NewClaim, ReceiptId,
    UserHandle,
};

struct SledTrees {
    db: Db,
    receipts: Tree,
    pending: Tree,
    by_user: Tree,
}

/// Sled-backed receipt ledger
#[derive(Clone)]
pub struct SledLedger {
    inner: Arc<SledTrees>,
}

impl SledLedger {
    /// Create or open the ledger at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        info!("Opening receipt ledger at: {}", path.as_ref().display());

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024) // 64MB cache
            .open()?;
        Self::from_db(db)
    }

    /// Build a ledger over an existing sled::Db
    pub fn from_db(db: Db) -> FaucetResult<Self> {
        let receipts = db.open_tree("receipts")?;
        let pending = db.open_tree("pending")?;
        let by_user = db.open_tree("by_user")?;

        Ok(Self {
            inner: Arc::new(SledTrees {
                db,
                receipts,
                pending,
                by_user,
            }),
        })
    }

    pub async fn flush(&self) -> FaucetResult<usize> {
        Ok(self.inner.db.flush_async().await?)
    }

    async fn blocking<T, F>(&self, op: F) -> FaucetResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SledTrees) -> FaucetResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| FaucetError::Internal(format!("ledger task failed: {}", e)))?
    }
}

fn push_component(key: &mut Vec<u8>, component: &str) {
    let len = u32::try_from(component.len()).unwrap_or(u32::MAX);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(component.as_bytes());
}

fn pending_key(network: &NetworkId, user: &UserHandle) -> Vec<u8> {
    let mut key = Vec::with_capacity(network.0.len() + user.0.len() + 8);
    push_component(&mut key, network.as_str());
    push_component(&mut key, user.as_str());
    key
}

fn user_prefix(user: &UserHandle) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.0.len() + 4);
    push_component(&mut key, user.as_str());
    key
}

fn user_key(user: &UserHandle, id: ReceiptId) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from_bytes(bytes: &[u8]) -> FaucetResult<ReceiptId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| FaucetError::Internal("Invalid receipt id format".to_string()))?;
    Ok(ReceiptId::from_be_bytes(raw))
}

fn flatten<T>(result: Result<T, TransactionError<FaucetError>>) -> FaucetResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(FaucetError::Database(err)),
    }
}

impl SledTrees {
    fn load(&self, id: ReceiptId) -> FaucetResult<Option<ClaimReceipt>> {
        match self.receipts.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn user_receipts(&self, user: &UserHandle) -> FaucetResult<Vec<ClaimReceipt>> {
        let prefix = user_prefix(user);
        let mut records = Vec::new();
        for item in self.by_user.scan_prefix(&prefix) {
            let (key, _) = item?;
            let id = id_from_bytes(&key[prefix.len()..])?;
            if let Some(receipt) = self.load(id)? {
                records.push(receipt);
            }
        }
        Ok(records)
    }

    fn insert_pending(&self, claim: NewClaim) -> FaucetResult<ClaimReceipt> {
        let id = self.db.generate_id()?;
        let receipt = ClaimReceipt::pending(id, claim);
        let value = bincode::serialize(&receipt)?;
        let id_bytes = id.to_be_bytes();
        let pending = pending_key(&receipt.network_id, &receipt.user);
        let by_user = user_key(&receipt.user, id);

        let result = (&self.receipts, &self.pending, &self.by_user).transaction(
            |(receipts_tx, pending_tx, by_user_tx)| {
                if pending_tx.get(pending.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        FaucetError::DuplicatePendingClaim {
                            network: receipt.network_id.clone(),
                            user: receipt.user.clone(),
                        },
                    ));
                }
                receipts_tx.insert(&id_bytes[..], value.as_slice())?;
                pending_tx.insert(pending.as_slice(), &id_bytes[..])?;
                by_user_tx.insert(by_user.as_slice(), Vec::<u8>::new())?;
                Ok(())
            },
        );
        flatten(result)?;

        debug!("Recorded pending receipt {} for {}", id, receipt.user);
        Ok(receipt)
    }

    fn update_status(
        &self,
        id: ReceiptId,
        status: ClaimStatus,
        note: Option<String>,
        resolved_at: i64,
    ) -> FaucetResult<ClaimReceipt> {
        let id_bytes = id.to_be_bytes();

        let result = (&self.receipts, &self.pending).transaction(|(receipts_tx, pending_tx)| {
            let bytes = receipts_tx
                .get(&id_bytes[..])?
                .ok_or(ConflictableTransactionError::Abort(FaucetError::ReceiptNotFound(id)))?;
            let mut receipt: ClaimReceipt = bincode::deserialize(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(FaucetError::from(e)))?;

            resolve_receipt(&mut receipt, status, note.clone(), resolved_at)
                .map_err(ConflictableTransactionError::Abort)?;

            let value = bincode::serialize(&receipt)
                .map_err(|e| ConflictableTransactionError::Abort(FaucetError::from(e)))?;
            receipts_tx.insert(&id_bytes[..], value)?;
            pending_tx.remove(pending_key(&receipt.network_id, &receipt.user))?;
            Ok(receipt)
        });
        let receipt = flatten(result)?;

        debug!("Receipt {} resolved as {}", id, status);
        Ok(receipt)
    }

    fn pending_older_than(&self, cutoff: i64) -> FaucetResult<Vec<ClaimReceipt>> {
        let mut records = Vec::new();
        for item in self.pending.iter() {
            let (_, value) = item?;
            if let Some(receipt) = self.load(id_from_bytes(&value)?)? {
                if receipt.timestamp <= cutoff {
                    records.push(receipt);
                }
            }
        }
        records.sort_by_key(|r| (r.timestamp, r.id));
        Ok(records)
    }

    fn stats(&self) -> FaucetResult<LedgerStats> {
        let mut stats = LedgerStats::default();
        let mut users = HashSet::new();
        for item in self.receipts.iter() {
            let (_, value) = item?;
            let receipt: ClaimReceipt = bincode::deserialize(&value)?;
            stats.record(&receipt);
            users.insert(receipt.user);
        }
        stats.unique_users = users.len() as u64;
        Ok(stats)
    }
}

#[async_trait]
impl ReceiptLedger for SledLedger {
    async fn insert_pending(&self, claim: NewClaim) -> FaucetResult<ClaimReceipt> {
        self.blocking(move |trees| trees.insert_pending(claim)).await
    }

    async fn get(&self, id: ReceiptId) -> FaucetResult<Option<ClaimReceipt>> {
        self.blocking(move |trees| trees.load(id)).await
    }

    async fn sum_verified(
        &self,
        network: &NetworkId,
        user: &UserHandle,
        since: Option<i64>,
    ) -> FaucetResult<Amount> {
        let network = network.clone();
        let user = user.clone();
        self.blocking(move |trees| {
            let receipts = trees.user_receipts(&user)?;
            Ok(verified_sum(
                receipts.iter().filter(|r| r.network_id == network),
                since,
            ))
        })
        .await
    }

    async fn has_pending(&self, network: &NetworkId, user: &UserHandle) -> FaucetResult<bool> {
        Ok(self.inner.pending.contains_key(pending_key(network, user))?)
    }

    async fn count_active_since(&self, user: &UserHandle, since: i64) -> FaucetResult<u64> {
        let user = user.clone();
        self.blocking(move |trees| {
            let count = trees
                .user_receipts(&user)?
                .iter()
                .filter(|r| r.status.is_active() && r.timestamp >= since)
                .count();
            Ok(count as u64)
        })
        .await
    }

    async fn pending_older_than(&self, cutoff: i64) -> FaucetResult<Vec<ClaimReceipt>> {
        self.blocking(move |trees| trees.pending_older_than(cutoff)).await
    }

    async fn update_status(
        &self,
        id: ReceiptId,
        status: ClaimStatus,
        note: Option<String>,
        resolved_at: i64,
    ) -> FaucetResult<ClaimReceipt> {
        self.blocking(move |trees| trees.update_status(id, status, note, resolved_at))
            .await
    }

    async fn receipts_for(
        &self,
        network: &NetworkId,
        user: &UserHandle,
    ) -> FaucetResult<Vec<ClaimReceipt>> {
        let network = network.clone();
        let user = user.clone();
        self.blocking(move |trees| {
            let mut records: Vec<ClaimReceipt> = trees
                .user_receipts(&user)?
                .into_iter()
                .filter(|r| r.network_id == network)
                .collect();
            records.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
            Ok(records)
        })
        .await
    }

    async fn stats(&self) -> FaucetResult<LedgerStats> {
        self.blocking(|trees| trees.stats()).await
    }
}
