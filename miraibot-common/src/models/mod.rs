// File: miraibot-common/src/models/mod.rs
pub mod auth;
pub mod credential;
pub mod stream;

pub use auth::{AuthAttempt, LoginOutcome, TwoFactorChallenge};
pub use credential::{AccountSecrets, SessionCookie, SessionCredential};
pub use stream::{ErrorClassification, StreamError, StreamMessage, StreamOutcome, SupervisorState};
