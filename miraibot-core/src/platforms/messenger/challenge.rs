// File: src/platforms/messenger/challenge.rs

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::Error;
use crate::http::{HttpClient, strip_json_guard};
use miraibot_common::models::SessionCredential;
use miraibot_common::traits::stream_traits::ChallengeClearer;

const FRIENDLY_NAME: &str = "FBScrapingWarningMutation";

/// Clears the platform's anti-scraping warning with its dedicated GraphQL
/// mutation. One request per detected challenge, no retries.
pub struct HttpChallengeClearer {
    http: Arc<dyn HttpClient>,
    endpoint: String,
    doc_id: String,
}

impl HttpChallengeClearer {
    pub fn new(http: Arc<dyn HttpClient>, endpoint: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            doc_id: doc_id.into(),
        }
    }

    fn form(&self, actor_id: &str) -> Vec<(String, String)> {
        vec![
            ("av".to_string(), actor_id.to_string()),
            ("fb_api_caller_class".to_string(), "RelayModern".to_string()),
            ("fb_api_req_friendly_name".to_string(), FRIENDLY_NAME.to_string()),
            ("variables".to_string(), "{}".to_string()),
            ("server_timestamps".to_string(), "true".to_string()),
            ("doc_id".to_string(), self.doc_id.clone()),
        ]
    }

    /// Success is `data.fb_scraping_warning_clear.success == true` with no
    /// `errors` member.
    fn cleared(body: &str) -> Result<bool, Error> {
        let json: Value = serde_json::from_str(strip_json_guard(body))?;
        if json.get("errors").is_some_and(|e| !e.is_null()) {
            warn!("Challenge clearance returned errors: {}", json["errors"]);
            return Ok(false);
        }
        Ok(json
            .pointer("/data/fb_scraping_warning_clear/success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }
}

#[async_trait]
impl ChallengeClearer for HttpChallengeClearer {
    async fn clear(&self, session: &SessionCredential) -> Result<bool, Error> {
        let actor = session
            .identity_id()
            .ok_or_else(|| Error::Auth("session has no identity id".into()))?;
        let headers = vec![("Cookie".to_string(), session.cookie_header())];

        let response = self
            .http
            .post_form(&self.endpoint, &headers, &self.form(actor))
            .await?;
        if !response.is_success() {
            error!("Challenge clearance failed with HTTP {}", response.status);
            return Ok(false);
        }

        let cleared = Self::cleared(&response.body)?;
        if cleared {
            info!("Platform warning cleared for account {}.", actor);
        } else {
            error!("Platform did not confirm warning clearance.");
        }
        Ok(cleared)
    }
}
