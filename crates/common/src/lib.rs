//! Shared types, errors and ambient utilities for the drip faucet.

pub mod error;
pub mod types;
pub mod utils;

pub use error::{FaucetError, FaucetResult};
pub use types::{
    Amount, ClaimReceipt, ClaimStatus, CreditPolicy, GlobalSettings, Network, NetworkId, NewClaim,
    ReceiptId, SignedAmount, User, UserHandle, VerificationStatus,
};
