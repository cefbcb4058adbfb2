use async_trait::async_trait;
use crate::error::Error;
use crate::models::credential::SessionCredential;

/// Durable home of the single cached session credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing is cached.
    async fn load(&self) -> Result<Option<SessionCredential>, Error>;

    /// Replaces the stored credential as a whole.
    async fn save(&self, credential: &SessionCredential) -> Result<(), Error>;

    /// Removes the stored credential. Returns whether something was removed.
    async fn delete(&self) -> Result<bool, Error>;
}
