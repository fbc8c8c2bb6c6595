use anyhow::{Context, Result};
use drip_faucet::FaucetConfig;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn load_faucet_config<P: AsRef<Path>>(path: P, db_path_override: Option<PathBuf>) -> Result<FaucetConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        FaucetConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        warn!("Config file {:?} not found, using environment defaults", path);
        FaucetConfig::from_env()
    };

    if let Some(db_path) = db_path_override {
        config.db_path = db_path.to_string_lossy().to_string();
    }

    Ok(config)
}
