//! Identity verification collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use drip_common::{FaucetError, FaucetResult, User, UserHandle, VerificationStatus};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Source of truth for a user's verification status.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_verification_status(&self, user: &UserHandle) -> FaucetResult<VerificationStatus>;
}

/// In-process directory. Unknown handles are `Unverified`.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    statuses: DashMap<UserHandle, VerificationStatus>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users<'a>(users: impl IntoIterator<Item = &'a User>) -> Self {
        let provider = Self::new();
        for user in users {
            provider.set_status(user.handle.clone(), user.verification_status);
        }
        provider
    }

    pub fn set_status(&self, user: UserHandle, status: VerificationStatus) {
        self.statuses.insert(user, status);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn get_verification_status(&self, user: &UserHandle) -> FaucetResult<VerificationStatus> {
        Ok(self
            .statuses
            .get(user)
            .map(|status| *status)
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    data: VerificationData,
}

#[derive(Debug, Deserialize)]
struct VerificationData {
    #[serde(default)]
    unique: bool,
}

/// Verification node client.
///
/// `GET {endpoint}/verifications/{app}/{handle}`:
/// - 404: handle not linked, `Unverified`
/// - 200 with `data.unique == false`: linked but not yet verified, `Pending`
/// - 200 with `data.unique == true`: `Verified`
///
/// Anything else is a `VerificationLookup` error.
pub struct HttpIdentityProvider {
    endpoint: Url,
    app: String,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(endpoint: String, app: String, timeout: Duration) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaucetError::Configuration(format!("identity client: {}", e)))?;

        let endpoint = Url::parse(&endpoint).map_err(|e| {
            FaucetError::Configuration(format!("identity endpoint {}: {}", endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(FaucetError::Configuration(format!(
                "identity endpoint {} cannot carry a path",
                endpoint
            )));
        }

        Ok(Self {
            endpoint,
            app,
            client,
        })
    }

    /// Each component is a separate, percent-encoded path segment.
    fn url(&self, user: &UserHandle) -> FaucetResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FaucetError::Configuration(format!(
                    "identity endpoint {} cannot carry a path",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["verifications", self.app.as_str(), user.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_verification_status(&self, user: &UserHandle) -> FaucetResult<VerificationStatus> {
        let response = self
            .client
            .get(self.url(user)?)
            .send()
            .await
            .map_err(|e| FaucetError::VerificationLookup(format!("Request failed: {}", e)))?;

        let status = match response.status() {
            StatusCode::NOT_FOUND => VerificationStatus::Unverified,
            code if code.is_success() => {
                let body: VerificationResponse = response.json().await.map_err(|e| {
                    FaucetError::VerificationLookup(format!("Invalid response: {}", e))
                })?;
                if body.data.unique {
                    VerificationStatus::Verified
                } else {
                    VerificationStatus::Pending
                }
            }
            code => {
                return Err(FaucetError::VerificationLookup(format!(
                    "Verification node returned {}",
                    code
                )))
            }
        };

        debug!("Verification status of {}: {}", user, status);
        Ok(status)
    }
}
