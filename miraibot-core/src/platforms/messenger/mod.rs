pub mod backoff;
pub mod challenge;
pub mod classify;
pub mod client;
pub mod runtime;

pub use backoff::{ReconnectPolicy, TransientTracker};
pub use challenge::HttpChallengeClearer;
pub use classify::{ErrorClassifier, SignatureSet, SignatureTable};
pub use client::{WebSocketChannel, WebSocketConnector};
pub use runtime::{StreamSupervisor, SupervisorHandle};
