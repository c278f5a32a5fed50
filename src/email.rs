use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::AppError;

/// Client for the external "is this a real email" lookup used at signup.
/// With no API key configured the remote call is skipped entirely and every
/// syntactically valid address is accepted.
pub struct EmailVerifier {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    deliverable: bool,
}

impl EmailVerifier {
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = std::env::var("EMAIL_VERIFY_URL")
            .unwrap_or_else(|_| "https://api.mailcheck.ai/email".to_string());
        let api_key = std::env::var("EMAIL_VERIFY_API_KEY").ok();

        Self::new(base_url, api_key)
    }

    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Single lookup per signup, no retries. Transport failures surface as a
    /// service error at request time.
    #[instrument(skip(self))]
    pub async fn verify(&self, email: &str) -> Result<bool, AppError> {
        let Some(api_key) = &self.api_key else {
            info!("Email verification key not configured, skipping remote lookup");
            return Ok(true);
        };

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, email))
            .bearer_auth(api_key)
            .send()
            .await?
            .error_for_status()?;

        let lookup: LookupResponse = response.json().await?;

        info!(deliverable = lookup.deliverable, "Email lookup completed");
        Ok(lookup.deliverable)
    }
}
