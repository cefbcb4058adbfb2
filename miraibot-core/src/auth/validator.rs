// File: src/auth/validator.rs

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::Error;
use crate::http::HttpClient;
use miraibot_common::models::SessionCredential;
use miraibot_common::traits::auth_traits::SessionValidator;

/// Confirms a session by fetching the account's own identity page with the
/// session cookies attached.
///
/// The platform answers a dead session with a redirect or a login form, so a
/// session only counts as valid when the reply is a 2xx that mentions the
/// session's own identity id.
pub struct HttpSessionValidator {
    http: Arc<dyn HttpClient>,
    identity_url: String,
}

impl HttpSessionValidator {
    pub fn new(http: Arc<dyn HttpClient>, identity_url: impl Into<String>) -> Self {
        Self {
            http,
            identity_url: identity_url.into(),
        }
    }
}

#[async_trait]
impl SessionValidator for HttpSessionValidator {
    async fn validate(&self, credential: &SessionCredential) -> Result<bool, Error> {
        let Some(identity) = credential.identity_id() else {
            debug!("Session has no identity cookie; treating as invalid.");
            return Ok(false);
        };

        let headers = vec![("Cookie".to_string(), credential.cookie_header())];
        let response = self.http.get(&self.identity_url, &headers).await?;

        if response.status >= 500 {
            return Err(Error::ValidationFailure(format!(
                "identity probe got HTTP {}",
                response.status
            )));
        }
        if !response.is_success() {
            debug!("Identity probe returned HTTP {}", response.status);
            return Ok(false);
        }
        if !response.body.contains(identity) {
            debug!("Identity probe did not mention account {}", identity);
            return Ok(false);
        }

        info!("Session authenticated as account {}", identity);
        Ok(true)
    }
}
