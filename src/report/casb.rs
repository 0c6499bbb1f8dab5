use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::error::RiskSyncError;

use super::ReportFetcher;

/// Downloads the risk score export from a CASB instance using HTTP basic auth.
pub struct CasbFetcher {
    client: reqwest::Client,
    url: String,
    username: String,
    password: SecretString,
}

impl std::fmt::Debug for CasbFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasbFetcher")
            .field("url", &self.url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl CasbFetcher {
    pub fn new(url: &str, username: &str, password: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_owned(),
            username: username.to_owned(),
            password,
        }
    }
}

#[async_trait]
impl ReportFetcher for CasbFetcher {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<String, RiskSyncError> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await
            .map_err(|e| RiskSyncError::ReportUnavailable(format!("request to CASB failed: {e}")))?
            .error_for_status()
            .map_err(|e| RiskSyncError::ReportUnavailable(format!("CASB rejected request: {e}")))?;

        let body = response.text().await.map_err(|e| {
            RiskSyncError::ReportUnavailable(format!("cannot read CASB response body: {e}"))
        })?;
        debug!(bytes = body.len(), "downloaded risk report");
        Ok(body)
    }
}
