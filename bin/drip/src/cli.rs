use clap::{Parser, Subcommand, ValueEnum};
use drip_common::ClaimStatus;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drip")]
#[command(about = "Faucet claim admission and ledger tool", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "drip.toml")]
    pub config: PathBuf,

    /// Path to the ledger database
    #[arg(short, long, value_name = "DIR")]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show claimed and unclaimed allowance for a user on a network
    Allowance {
        #[arg(short, long)]
        network: String,
        #[arg(short, long)]
        user: String,
    },
    /// Admit a claim and record it as pending
    Claim {
        #[arg(short, long)]
        network: String,
        #[arg(short, long)]
        user: String,
        /// Amount in minor units
        #[arg(short, long)]
        amount: String,
    },
    /// List a user's receipts on a network, newest first
    History {
        #[arg(short, long)]
        network: String,
        #[arg(short, long)]
        user: String,
    },
    /// List pending receipts awaiting disbursement
    Pending {
        /// Only receipts at least this many seconds old
        #[arg(long, default_value_t = 0)]
        older_than: u64,
    },
    /// Resolve a pending receipt
    Resolve {
        #[arg(long)]
        id: u64,
        #[arg(long, value_enum)]
        status: Resolution,
        /// Transaction hash or rejection reason
        #[arg(long)]
        note: Option<String>,
    },
    /// Ledger statistics
    Stats {
        /// Also print Prometheus metrics for this run
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Resolution {
    Verified,
    Rejected,
}

impl From<Resolution> for ClaimStatus {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Verified => ClaimStatus::Verified,
            Resolution::Rejected => ClaimStatus::Rejected,
        }
    }
}
