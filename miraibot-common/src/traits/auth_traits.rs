use async_trait::async_trait;
use crate::error::Error;
use crate::models::auth::{LoginOutcome, TwoFactorChallenge};
use crate::models::credential::{AccountSecrets, SessionCredential};

/// Lightweight authenticated probe deciding whether a stored session is
/// still alive.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// `Ok(false)` means the platform rejected the session. Callers treat
    /// `Err(_)` the same way.
    async fn validate(&self, credential: &SessionCredential) -> Result<bool, Error>;
}

/// Interactive credential login against the platform.
#[async_trait]
pub trait LoginClient: Send + Sync {
    /// Submits account identifier and secret. Wrong credentials must be
    /// reported as `Error::FatalAuth`.
    async fn login(&self, account: &AccountSecrets) -> Result<LoginOutcome, Error>;

    /// Answers a pending two-factor challenge.
    async fn submit_two_factor(
        &self,
        challenge: &TwoFactorChallenge,
        code: &str,
    ) -> Result<LoginOutcome, Error>;
}

/// Out-of-band source of two-factor codes (usually a console).
#[async_trait]
pub trait TwoFactorInput: Send + Sync {
    /// Blocks until one code line is available. Timeouts and cancellation
    /// are applied by the caller.
    async fn read_code(&self, challenge: &TwoFactorChallenge) -> Result<String, Error>;
}
