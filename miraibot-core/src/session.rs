// src/session.rs
//
// Ties authentication and the stream together: a rejected session goes back
// to the coordinator for a fresh login, and the stream resumes on the new
// credential.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Error;
use crate::auth::AuthenticationCoordinator;
use crate::platforms::messenger::{StreamSupervisor, SupervisorHandle};
use miraibot_common::models::StreamOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested.
    Stopped,
    /// The platform raised a challenge that could not be cleared.
    ChallengeFailed,
}

pub struct SessionRuntime {
    coordinator: AuthenticationCoordinator,
    supervisor: StreamSupervisor,
    cancel: CancellationToken,
}

impl SessionRuntime {
    pub fn new(
        coordinator: AuthenticationCoordinator,
        supervisor: StreamSupervisor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            cancel,
        }
    }

    pub fn supervisor_handle(&self) -> SupervisorHandle {
        self.supervisor.handle()
    }

    /// Authentication failures (bad credentials, spent retry budget,
    /// unanswered 2FA) come back as `Err`. Every session the stream hands
    /// back as rejected spends one attempt of the coordinator's budget.
    pub async fn run(&mut self) -> Result<RunOutcome, Error> {
        loop {
            let session = match self.coordinator.acquire_session().await {
                Ok(session) => session,
                Err(Error::Cancelled) => return Ok(RunOutcome::Stopped),
                Err(e) => return Err(e),
            };
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome::Stopped);
            }

            info!("Session ready; starting realtime stream.");
            match self.supervisor.run(session).await {
                StreamOutcome::Cancelled => return Ok(RunOutcome::Stopped),
                StreamOutcome::ChallengeFailed => return Ok(RunOutcome::ChallengeFailed),
                StreamOutcome::SessionInvalidated => {
                    self.coordinator.discard_session().await;
                    if self.coordinator.record_rejection() {
                        warn!("Platform rejected the session; re-authenticating.");
                    }
                }
            }
        }
    }
}
