use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset amount in minor units (wei for EVM networks).
pub type Amount = u128;

/// Remaining allowance. Goes negative once verified claims exceed the cap.
pub type SignedAmount = i128;

/// Ledger-assigned receipt identifier.
pub type ReceiptId = u64;

pub const SECONDS_PER_DAY: i64 = 86_400;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

// --- NewTypes ---

/// Configured key of a target network.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        NetworkId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(s: &str) -> Self {
        NetworkId(s.to_string())
    }
}

/// External identity handle of a user, unique across the faucet.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHandle(pub String);

impl UserHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        UserHandle(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserHandle({})", self.0)
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserHandle {
    fn from(s: &str) -> Self {
        UserHandle(s.to_string())
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Pending,
    Verified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Verified,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Verified => "verified",
            ClaimStatus::Rejected => "rejected",
        }
    }

    /// Pending and Verified receipts both count against the weekly claim limit.
    pub fn is_active(&self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::Verified)
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounting policy applied to a network's allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditPolicy {
    /// Cap applies to every verified claim ever made.
    Lifetime,
    /// Cap applies to verified claims since the current weekly boundary.
    #[default]
    Weekly,
    /// Weekly cap, raised for users the on-chain registry reports as verified.
    RegistryOverride,
}

// --- Records ---

/// A target blockchain the faucet disburses on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    pub chain_id: u64,
    pub max_claim_amount: Amount,
    pub policy: CreditPolicy,
    /// Cap granted to registry-verified users under `CreditPolicy::RegistryOverride`.
    pub elevated_claim_amount: Option<Amount>,
}

impl Network {
    pub fn new(id: impl Into<String>, chain_id: u64, max_claim_amount: Amount) -> Self {
        let id = NetworkId::new(id);
        Self {
            name: id.0.clone(),
            id,
            chain_id,
            max_claim_amount,
            policy: CreditPolicy::default(),
            elevated_claim_amount: None,
        }
    }

    pub fn with_policy(mut self, policy: CreditPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_elevated_claim_amount(mut self, amount: Amount) -> Self {
        self.elevated_claim_amount = Some(amount);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub handle: UserHandle,
    pub address: String,
    pub verification_status: VerificationStatus,
}

impl User {
    pub fn new(handle: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            handle: UserHandle::new(handle),
            address: address.into(),
            verification_status: VerificationStatus::Unverified,
        }
    }

    pub fn with_status(mut self, status: VerificationStatus) -> Self {
        self.verification_status = status;
        self
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }
}

/// Claim request accepted for recording; the ledger assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClaim {
    pub network_id: NetworkId,
    pub user: UserHandle,
    pub amount: Amount,
    pub timestamp: i64,
}

/// Append-only ledger entry for one claim attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub id: ReceiptId,
    pub network_id: NetworkId,
    pub user: UserHandle,
    pub amount: Amount,
    /// Creation time, unix seconds
    pub timestamp: i64,
    pub status: ClaimStatus,
    /// Set by the disbursement processor on resolution (tx hash or reason).
    pub note: Option<String>,
    pub resolved_at: Option<i64>,
}

impl ClaimReceipt {
    pub fn pending(id: ReceiptId, claim: NewClaim) -> Self {
        Self {
            id,
            network_id: claim.network_id,
            user: claim.user,
            amount: claim.amount,
            timestamp: claim.timestamp,
            status: ClaimStatus::Pending,
            note: None,
            resolved_at: None,
        }
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }
}

/// Process-wide settings, loaded once and passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Max Pending+Verified claims per user per week, summed over all networks.
    pub weekly_chain_claim_limit: u32,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            weekly_chain_claim_limit: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_status_activity() {
        assert!(ClaimStatus::Pending.is_active());
        assert!(ClaimStatus::Verified.is_active());
        assert!(!ClaimStatus::Rejected.is_active());
        assert!(!ClaimStatus::Pending.is_final());
        assert!(ClaimStatus::Rejected.is_final());
    }

    #[test]
    fn test_pending_receipt_from_claim() {
        let claim = NewClaim {
            network_id: NetworkId::from("gnosis"),
            user: UserHandle::from("alice"),
            amount: 500,
            timestamp: 1_700_000_000,
        };
        let receipt = ClaimReceipt::pending(7, claim);
        assert_eq!(receipt.id, 7);
        assert!(receipt.is_pending());
        assert_eq!(receipt.datetime().timestamp(), 1_700_000_000);
        assert!(receipt.resolved_at.is_none());
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: CreditPolicy = serde_json::from_str("\"registry_override\"").unwrap();
        assert_eq!(policy, CreditPolicy::RegistryOverride);
        assert_eq!(CreditPolicy::default(), CreditPolicy::Weekly);
    }
}
