use crate::types::{Amount, ClaimStatus, NetworkId, ReceiptId, SignedAmount, UserHandle};
use thiserror::Error;

/// Errors raised by claim admission, accounting and the receipt ledger
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Insufficient allowance: requested {requested}, unclaimed {unclaimed}")]
    InsufficientAllowance {
        requested: Amount,
        unclaimed: SignedAmount,
    },

    #[error("User {0} is not verified")]
    UserNotVerified(UserHandle),

    #[error("User {user} already has a pending claim on {network}")]
    DuplicatePendingClaim { network: NetworkId, user: UserHandle },

    #[error("Weekly claim limit exceeded: {count} of {limit} claims used")]
    WeeklyClaimLimitExceeded { count: u64, limit: u32 },

    /// No strategy or manager can be built for a network
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(NetworkId),

    #[error("Verification lookup failed: {0}")]
    VerificationLookup(String),

    #[error("Registry lookup failed: {0}")]
    RegistryLookup(String),

    #[error("Receipt not found: {0}")]
    ReceiptNotFound(ReceiptId),

    #[error("Receipt {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: ReceiptId,
        from: ClaimStatus,
        to: ClaimStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Stable code for mapping onto user-visible rejection reasons.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            FaucetError::UserNotVerified(_) => "USER_NOT_VERIFIED",
            FaucetError::DuplicatePendingClaim { .. } => "DUPLICATE_PENDING_CLAIM",
            FaucetError::WeeklyClaimLimitExceeded { .. } => "WEEKLY_CLAIM_LIMIT_EXCEEDED",
            FaucetError::Configuration(_) => "CONFIGURATION_ERROR",
            FaucetError::UnknownNetwork(_) => "UNKNOWN_NETWORK",
            FaucetError::VerificationLookup(_) => "VERIFICATION_LOOKUP_ERROR",
            FaucetError::RegistryLookup(_) => "REGISTRY_LOOKUP_ERROR",
            FaucetError::ReceiptNotFound(_) => "RECEIPT_NOT_FOUND",
            FaucetError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            FaucetError::Database(_) => "DATABASE_ERROR",
            FaucetError::Serialization(_) => "SERIALIZATION_ERROR",
            FaucetError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for admission outcomes a user can act on, as opposed to faults.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FaucetError::InsufficientAllowance { .. }
                | FaucetError::UserNotVerified(_)
                | FaucetError::DuplicatePendingClaim { .. }
                | FaucetError::WeeklyClaimLimitExceeded { .. }
        )
    }
}

impl From<bincode::Error> for FaucetError {
    fn from(err: bincode::Error) -> Self {
        FaucetError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for FaucetError {
    fn from(err: serde_json::Error) -> Self {
        FaucetError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for FaucetError {
    fn from(err: config::ConfigError) -> Self {
        FaucetError::Configuration(err.to_string())
    }
}

impl From<toml::de::Error> for FaucetError {
    fn from(err: toml::de::Error) -> Self {
        FaucetError::Configuration(format!("TOML parsing error: {}", err))
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_not_faults() {
        let err = FaucetError::WeeklyClaimLimitExceeded { count: 3, limit: 3 };
        assert!(err.is_rejection());
        assert_eq!(err.code(), "WEEKLY_CLAIM_LIMIT_EXCEEDED");

        let err = FaucetError::RegistryLookup("timeout".to_string());
        assert!(!err.is_rejection());
        assert_eq!(err.code(), "REGISTRY_LOOKUP_ERROR");
    }

    #[test]
    fn test_display_includes_amounts() {
        let err = FaucetError::InsufficientAllowance {
            requested: 11,
            unclaimed: -4,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient allowance: requested 11, unclaimed -4"
        );
    }
}
