//! Faucet claim admission and credit accounting.
//!
//! This crate decides whether a user may claim funds on a network:
//! - Credit strategies compute claimed and unclaimed allowance
//! - Claim managers run the admission checks under a per-user lock
//! - Factories resolve both from network configuration
//! - The disbursement queue hands Pending receipts to the payout processor

pub mod config;
pub mod context;
pub mod disbursement;
pub mod factory;
pub mod identity;
pub mod locks;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod strategy;

pub use config::{FaucetConfig, IdentityConfig, NetworkConfig, RegistryConfig};
pub use context::FaucetContext;
pub use disbursement::DisbursementQueue;
pub use factory::{ClaimManagerFactory, CreditStrategyFactory};
pub use identity::{HttpIdentityProvider, IdentityProvider, StaticIdentityProvider};
pub use locks::UserLocks;
pub use manager::{ClaimManager, ManagerKind};
pub use metrics::FaucetMetrics;
pub use registry::{RpcUserRegistry, StaticUserRegistry, VerifiedUserRegistry};
pub use service::{Allowance, FaucetService};
pub use strategy::{
    last_week_boundary, second_last_week_boundary, Balance, CreditStrategy, StrategyKind,
};
