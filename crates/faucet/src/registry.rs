//! On-chain verified-user registry lookups.

use async_trait::async_trait;
use dashmap::DashSet;
use drip_common::{FaucetError, FaucetResult, UserHandle};
use std::time::Duration;
use tracing::debug;

/// Registry function queried by [`RpcUserRegistry`]
pub const IS_VERIFIED_USER_SIGNATURE: &str = "isVerifiedUser(address)";

/// Registry reporting whether a user is verified on-chain.
///
/// Failures must surface as `RegistryLookup`; they are never read as
/// "not verified".
#[async_trait]
pub trait VerifiedUserRegistry: Send + Sync {
    async fn is_verified_user(&self, user: &UserHandle) -> FaucetResult<bool>;
}

/// JSON-RPC client calling the registry contract with `eth_call`.
pub struct RpcUserRegistry {
    rpc_url: String,
    contract_address: String,
    selector: [u8; 4],
    client: reqwest::Client,
}

impl RpcUserRegistry {
    pub fn new(rpc_url: String, contract_address: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::Configuration(format!("registry client: {}", e)))?;

        let hash = keccak_hash::keccak(IS_VERIFIED_USER_SIGNATURE.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash.0[..4]);

        Ok(Self {
            rpc_url,
            contract_address,
            selector,
            client,
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> FaucetResult<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FaucetError::RegistryLookup(format!("Request failed: {}", e)))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FaucetError::RegistryLookup(format!("Invalid response: {}", e)))?;

        if let Some(error) = json.get("error") {
            return Err(FaucetError::RegistryLookup(error.to_string()));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| FaucetError::RegistryLookup("Missing result".to_string()))
    }

    /// ABI-encoded `isVerifiedUser(address)` call data for the handle.
    pub fn encode_call(&self, user: &UserHandle) -> FaucetResult<String> {
        let address = parse_address(user.as_str())?;
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&self.selector);
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(&address);
        Ok(format!("0x{}", hex::encode(data)))
    }
}

#[async_trait]
impl VerifiedUserRegistry for RpcUserRegistry {
    async fn is_verified_user(&self, user: &UserHandle) -> FaucetResult<bool> {
        let data = self.encode_call(user)?;
        let result = self
            .call(
                "eth_call",
                serde_json::json!([{ "to": self.contract_address, "data": data }, "latest"]),
            )
            .await?;

        let verified = decode_bool(result.as_str().unwrap_or_default())?;
        debug!("Registry reports {} verified={}", user, verified);
        Ok(verified)
    }
}

fn parse_address(handle: &str) -> FaucetResult<[u8; 20]> {
    let bytes = hex::decode(handle.trim_start_matches("0x")).map_err(|e| {
        FaucetError::RegistryLookup(format!("{} is not an address: {}", handle, e))
    })?;
    bytes
        .try_into()
        .map_err(|_| FaucetError::RegistryLookup(format!("{} is not a 20-byte address", handle)))
}

/// Decodes an ABI `bool` return word.
fn decode_bool(word: &str) -> FaucetResult<bool> {
    let bytes = hex::decode(word.trim_start_matches("0x"))
        .map_err(|e| FaucetError::RegistryLookup(format!("Invalid return data: {}", e)))?;
    if bytes.len() < 32 {
        return Err(FaucetError::RegistryLookup(format!(
            "Return data too short: {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes[..32].iter().any(|b| *b != 0))
}

/// Fixed registry contents, for tests and offline deployments.
#[derive(Debug, Default)]
pub struct StaticUserRegistry {
    verified: DashSet<UserHandle>,
}

impl StaticUserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verified(&self, user: UserHandle, verified: bool) {
        if verified {
            self.verified.insert(user);
        } else {
            self.verified.remove(&user);
        }
    }
}

#[async_trait]
impl VerifiedUserRegistry for StaticUserRegistry {
    async fn is_verified_user(&self, user: &UserHandle) -> FaucetResult<bool> {
        Ok(self.verified.contains(user))
    }
}
