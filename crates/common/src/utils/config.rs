use crate::error::{FaucetError, FaucetResult};
use ::config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads configuration from a file into a struct.
/// Supports TOML, YAML, JSON, etc. based on file extension; `DRIP_`-prefixed
/// environment variables override file values (`DRIP_DB_PATH`,
/// `DRIP_SETTINGS__WEEKLY_CHAIN_CLAIM_LIMIT`).
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> FaucetResult<T> {
    let path_str = path
        .as_ref()
        .to_str()
        .ok_or_else(|| FaucetError::Configuration("Invalid config path".to_string()))?;

    let settings = Config::builder()
        .add_source(File::with_name(path_str))
        .add_source(
            Environment::with_prefix("DRIP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}

/// Parses a decimal amount string the way amounts are written in config files.
pub fn parse_amount(field: &str, value: &str) -> FaucetResult<u128> {
    value.trim().parse::<u128>().map_err(|e| {
        FaucetError::Configuration(format!("{} is not a valid amount ({:?}): {}", field, value, e))
    })
}
