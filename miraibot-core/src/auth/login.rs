// File: src/auth/login.rs

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Error;
use crate::http::{HttpClient, HttpResponse, strip_json_guard};
use miraibot_common::models::{AccountSecrets, LoginOutcome, SessionCredential, TwoFactorChallenge};
use miraibot_common::traits::auth_traits::LoginClient;

/// Talks to a login bridge that performs the platform's credential login and
/// hands back the resulting appstate.
///
/// Replies are JSON: `{"appState": [...]}` on success, or
/// `{"error": "<code>", ...}` where `login-approval` carries a
/// `continuation` for the 2FA step.
pub struct HttpLoginClient {
    http: Arc<dyn HttpClient>,
    login_url: String,
    two_factor_url: String,
}

#[derive(Debug, Deserialize)]
struct LoginReply {
    #[serde(rename = "appState", default)]
    app_state: Option<SessionCredential>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    continuation: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpLoginClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        login_url: impl Into<String>,
        two_factor_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            login_url: login_url.into(),
            two_factor_url: two_factor_url.into(),
        }
    }

    fn interpret(response: HttpResponse) -> Result<LoginOutcome, Error> {
        let reply: LoginReply = match serde_json::from_str(strip_json_guard(&response.body)) {
            Ok(r) => r,
            Err(e) => {
                return Err(Error::Auth(format!(
                    "unreadable login reply (HTTP {}): {}",
                    response.status, e
                )));
            }
        };

        if let Some(code) = reply.error.as_deref() {
            return match code {
                "login-approval" => {
                    let continuation = reply.continuation.ok_or_else(|| {
                        Error::Auth("login-approval without continuation".into())
                    })?;
                    let mut challenge = TwoFactorChallenge::new(continuation);
                    if let Some(msg) = reply.message {
                        challenge.message = msg;
                    }
                    Ok(LoginOutcome::TwoFactorRequired(challenge))
                }
                "wrong-username" | "wrong-password" => {
                    warn!("Login rejected: wrong email or password.");
                    Err(Error::FatalAuth(code.to_string()))
                }
                other => Err(Error::Auth(format!(
                    "login failed: {}{}",
                    other,
                    reply.message.map(|m| format!(" ({})", m)).unwrap_or_default()
                ))),
            };
        }

        match reply.app_state {
            Some(state) if !state.is_empty() => Ok(LoginOutcome::Success(state)),
            _ => Err(Error::Auth(format!(
                "login reply without session (HTTP {})",
                response.status
            ))),
        }
    }
}

#[async_trait]
impl LoginClient for HttpLoginClient {
    async fn login(&self, account: &AccountSecrets) -> Result<LoginOutcome, Error> {
        debug!("Submitting credentials for {}", account.identifier);
        let form = vec![
            ("email".to_string(), account.identifier.clone()),
            ("password".to_string(), account.secret.clone()),
        ];
        let response = self.http.post_form(&self.login_url, &[], &form).await?;
        Self::interpret(response)
    }

    async fn submit_two_factor(
        &self,
        challenge: &TwoFactorChallenge,
        code: &str,
    ) -> Result<LoginOutcome, Error> {
        let form = vec![
            ("continuation".to_string(), challenge.continuation.clone()),
            ("code".to_string(), code.to_string()),
        ];
        let response = self.http.post_form(&self.two_factor_url, &[], &form).await?;
        Self::interpret(response)
    }
}
