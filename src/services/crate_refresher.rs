//! Workflow crate refresh used by `check_workflows`.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Timeouts;
use crate::error::{AppError, AppResult};
use crate::models::WorkflowVersion;
use crate::services::session::AuthContext;

/// Re-downloads the crate archive of a workflow version.
#[async_trait]
pub trait CrateRefresher: Send + Sync {
    /// Download the crate of `version` as the current user and return its SHA-256 digest.
    async fn refresh(&self, version: &WorkflowVersion, auth: &dyn AuthContext) -> AppResult<String>;
}

/// Fetches crate archives over HTTP.
pub struct RemoteCrateRefresher {
    http_client: reqwest::Client,
}

impl RemoteCrateRefresher {
    pub fn new(timeouts: &Timeouts) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeouts.ci_connect)
            .timeout(timeouts.ci_request)
            .build()
            .map_err(|e| AppError::TestingService(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl CrateRefresher for RemoteCrateRefresher {
    async fn refresh(&self, version: &WorkflowVersion, auth: &dyn AuthContext) -> AppResult<String> {
        let uri = version
            .ro_crate_uri
            .as_deref()
            .ok_or_else(|| AppError::NotFound(format!("RO-Crate location of {}", version)))?;

        let mut request = self.http_client.get(uri);
        if let Some(token) = auth.current_user().and_then(|u| u.api_token) {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::TestingService(format!(
                "Download of RO-Crate {} returned {}",
                uri, status
            )));
        }
        let bytes = response.bytes().await?;
        debug!(version = %version, size = bytes.len(), "RO-Crate downloaded");
        Ok(digest(&bytes))
    }
}
