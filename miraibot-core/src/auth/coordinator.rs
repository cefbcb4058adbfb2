// miraibot-core/src/auth/coordinator.rs
//
// Acquires a usable session: cached credential first, interactive login as
// the fallback, bounded by a process-wide retry budget.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Error;
use crate::config::{AuthSettings, account_secrets_from_env};
use miraibot_common::models::{AccountSecrets, AuthAttempt, LoginOutcome, SessionCredential, TwoFactorChallenge};
use miraibot_common::traits::auth_traits::{LoginClient, SessionValidator, TwoFactorInput};
use miraibot_common::traits::repository_traits::CredentialStore;

type SecretsSource = Arc<dyn Fn() -> Result<AccountSecrets, Error> + Send + Sync>;

pub struct AuthenticationCoordinator {
    store: Arc<dyn CredentialStore>,
    validator: Arc<dyn SessionValidator>,
    login: Arc<dyn LoginClient>,
    two_factor: Arc<dyn TwoFactorInput>,
    secrets: SecretsSource,
    settings: AuthSettings,
    attempts: AuthAttempt,
    cancel: CancellationToken,
}

impl AuthenticationCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        validator: Arc<dyn SessionValidator>,
        login: Arc<dyn LoginClient>,
        two_factor: Arc<dyn TwoFactorInput>,
        settings: AuthSettings,
        cancel: CancellationToken,
    ) -> Self {
        let attempts = AuthAttempt::new(settings.max_attempts);
        Self {
            store,
            validator,
            login,
            two_factor,
            secrets: Arc::new(account_secrets_from_env),
            settings,
            attempts,
            cancel,
        }
    }

    /// Replaces the environment lookup for account secrets.
    pub fn with_secrets<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Result<AccountSecrets, Error> + Send + Sync + 'static,
    {
        self.secrets = Arc::new(source);
        self
    }

    pub fn attempts(&self) -> AuthAttempt {
        self.attempts
    }

    /// Returns a live session, logging in interactively when the cached one
    /// is missing or rejected.
    ///
    /// Wrong credentials (`FatalAuth`), an unanswered 2FA prompt and
    /// cancellation end the call immediately. Every other failure spends one
    /// attempt, erases the cached credential and restarts the whole cycle;
    /// once the budget is spent the call fails with `AuthExhausted`.
    pub async fn acquire_session(&mut self) -> Result<SessionCredential, Error> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.attempts.is_exhausted() {
                error!(
                    "Authentication retry budget exhausted ({}/{}).",
                    self.attempts.attempts_used(),
                    self.attempts.max_attempts()
                );
                return Err(Error::AuthExhausted { attempts: self.attempts.attempts_used() });
            }

            match self.run_cycle().await {
                Ok(credential) => return Ok(credential),
                Err(e) if e.is_terminal_auth() => {
                    error!("Authentication stopped: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Authentication cycle failed: {}", e);
                    self.erase_stored().await;
                    if self.attempts.record_failure() {
                        info!(
                            "Retrying login (attempt {}/{})...",
                            self.attempts.attempts_used() + 1,
                            self.attempts.max_attempts()
                        );
                    }
                }
            }
        }
    }

    /// Spends one attempt for a session the platform rejected after it was
    /// handed out. Returns `false` once no further cycle may run, in which
    /// case the next `acquire_session` fails with `AuthExhausted`.
    pub fn record_rejection(&mut self) -> bool {
        let more = self.attempts.record_failure();
        warn!(
            "Session rejected by the platform ({}/{} attempts used).",
            self.attempts.attempts_used(),
            self.attempts.max_attempts()
        );
        more
    }

    /// Drops the cached credential so the next `acquire_session` logs in
    /// from scratch. Used when the stream reports the session as dead.
    pub async fn discard_session(&self) {
        self.erase_stored().await;
    }

    async fn run_cycle(&mut self) -> Result<SessionCredential, Error> {
        if let Some(cached) = self.load_stored().await {
            info!("Found cached session {:?}; validating...", cached);
            if self.probe(&cached).await? {
                info!("Cached session is still valid.");
                return Ok(cached);
            }
            warn!("Cached session is expired or invalid.");
            self.erase_stored().await;
        }

        info!("Logging in with account credentials...");
        let credential = self.interactive_login().await?;
        self.store.save(&credential).await?;
        info!("Login succeeded; session {:?} saved.", credential);
        Ok(credential)
    }

    async fn load_stored(&self) -> Option<SessionCredential> {
        match self.store.load().await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not read cached session, ignoring it: {}", e);
                None
            }
        }
    }

    /// Probe errors count as a rejection; only cancellation escapes.
    async fn probe(&self, credential: &SessionCredential) -> Result<bool, Error> {
        match self.cancellable(self.validator.validate(credential)).await {
            Ok(valid) => Ok(valid),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!("Session probe failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn interactive_login(&self) -> Result<SessionCredential, Error> {
        let account = (self.secrets)()?;
        let mut outcome = self.cancellable(self.login.login(&account)).await?;
        let mut prompts = 0u32;

        loop {
            match outcome {
                LoginOutcome::Success(credential) => {
                    if credential.is_empty() {
                        return Err(Error::Auth("login returned an empty session".into()));
                    }
                    return Ok(credential);
                }
                LoginOutcome::TwoFactorRequired(challenge) => {
                    if prompts >= self.settings.max_two_factor_prompts {
                        return Err(Error::Auth(format!(
                            "two-factor code rejected {} time(s)",
                            prompts
                        )));
                    }
                    prompts += 1;
                    warn!("Two-factor approval required: {}", challenge.message);
                    let code = self.read_two_factor_code(&challenge).await?;
                    outcome = self
                        .cancellable(self.login.submit_two_factor(&challenge, &code))
                        .await?;
                }
            }
        }
    }

    async fn read_two_factor_code(&self, challenge: &TwoFactorChallenge) -> Result<String, Error> {
        let wait = self.settings.two_factor_timeout();
        let read = tokio::time::timeout(wait, self.two_factor.read_code(challenge));
        let code = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            res = read => match res {
                Ok(code) => code?,
                Err(_) => {
                    error!("No two-factor code entered within {}s.", wait.as_secs());
                    return Err(Error::AuthChallengeTimeout);
                }
            },
        };
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(Error::Auth("empty two-factor code".into()));
        }
        Ok(code)
    }

    async fn erase_stored(&self) {
        if let Err(e) = self.store.delete().await {
            warn!("Failed to delete cached session: {}", e);
        }
    }

    async fn cancellable<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = fut => res,
        }
    }
}
