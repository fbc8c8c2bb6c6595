mod cli;
mod config_loader;

use anyhow::{anyhow, Context};
use clap::Parser;
use drip_common::utils::config::parse_amount;
use drip_common::utils::logging::init_logging;
use drip_common::{NetworkId, User};
use drip_faucet::{FaucetConfig, FaucetService};
use drip_storage::SledLedger;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Configured user for the handle, or an unlisted one using the handle as address.
fn resolve_user(config: &FaucetConfig, handle: &str) -> User {
    config
        .identity
        .users
        .iter()
        .find(|user| user.handle.as_str() == handle)
        .cloned()
        .unwrap_or_else(|| User::new(handle, handle))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI
    let args = cli::Cli::parse();

    // 2. Load Config
    let config = config_loader::load_faucet_config(&args.config, args.db_path)?;

    // 3. Setup Logging
    init_logging(&config.logging).map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    // 4. Open Ledger
    info!("Opening ledger at {}", config.db_path);
    let ledger = Arc::new(SledLedger::open(&config.db_path).context("opening ledger")?);
    let service = FaucetService::from_config(&config, ledger.clone())?;

    // 5. Run Command
    match args.command {
        cli::Commands::Allowance { network, user } => {
            let user = resolve_user(&config, &user);
            let allowance = service.allowance(&NetworkId::new(network), &user).await?;
            print_json(&allowance)?;
        }
        cli::Commands::Claim {
            network,
            user,
            amount,
        } => {
            let amount = parse_amount("amount", &amount)?;
            let user = resolve_user(&config, &user);
            let receipt = service.claim(&NetworkId::new(network), &user, amount).await?;
            print_json(&receipt)?;
        }
        cli::Commands::History { network, user } => {
            let user = resolve_user(&config, &user);
            let receipts = service.history(&NetworkId::new(network), &user.handle).await?;
            print_json(&receipts)?;
        }
        cli::Commands::Pending { older_than } => {
            let receipts = service
                .disbursement()
                .pending_older_than(Duration::from_secs(older_than))
                .await?;
            print_json(&receipts)?;
        }
        cli::Commands::Resolve { id, status, note } => {
            let receipt = service
                .disbursement()
                .resolve(id, status.into(), note)
                .await?;
            print_json(&receipt)?;
        }
        cli::Commands::Stats { metrics } => {
            print_json(&service.statistics().await?)?;
            if metrics {
                print!("{}", service.metrics()?);
            }
        }
    }

    ledger.flush().await?;
    Ok(())
}
