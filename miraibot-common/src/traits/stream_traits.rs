use async_trait::async_trait;
use crate::error::Error;
use crate::models::credential::SessionCredential;
use crate::models::stream::{StreamError, StreamMessage};

/// Opens realtime channels. Each call yields a fresh, independent channel.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn open(&self, session: &SessionCredential) -> Result<Box<dyn RealtimeChannel>, StreamError>;
}

/// One live realtime subscription: a finite sequence of inbound items plus
/// an explicit close.
#[async_trait]
pub trait RealtimeChannel: Send {
    /// Next inbound item, or `None` once the channel has ended.
    async fn next_item(&mut self) -> Option<Result<StreamMessage, StreamError>>;

    /// Closes the underlying transport. Calling it twice is harmless.
    async fn close(&mut self) -> Result<(), Error>;

    /// The session as it stands after the connection handshake, including
    /// any cookies the platform rotated.
    fn session(&self) -> SessionCredential;
}

/// Clears an anti-automation warning raised on the account.
#[async_trait]
pub trait ChallengeClearer: Send + Sync {
    /// `Ok(true)` only when the platform confirmed the warning is cleared.
    async fn clear(&self, session: &SessionCredential) -> Result<bool, Error>;
}

/// Receives every inbound message that survived filtering.
#[async_trait]
pub trait EventRouter: Send + Sync {
    async fn route(&self, message: StreamMessage);
}
