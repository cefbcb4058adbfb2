// File: src/platforms/messenger/runtime.rs
//
// Keeps exactly one realtime channel alive for an authenticated session:
// rotates it on a timer, routes what it delivers and recovers from errors
// according to their classification.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::Error;
use crate::config::StreamSettings;
use miraibot_common::models::{
    ErrorClassification, SessionCredential, StreamError, StreamMessage, StreamOutcome, SupervisorState,
};
use miraibot_common::traits::repository_traits::CredentialStore;
use miraibot_common::traits::stream_traits::{ChallengeClearer, EventRouter, RealtimeChannel, RealtimeConnector};

use super::backoff::TransientTracker;
use super::classify::ErrorClassifier;

/// The single live channel plus bookkeeping for logs.
struct StreamConnection {
    channel: Box<dyn RealtimeChannel>,
    opened_at: DateTime<Utc>,
    last_error: Option<ErrorClassification>,
}

impl StreamConnection {
    fn new(channel: Box<dyn RealtimeChannel>) -> Self {
        Self {
            channel,
            opened_at: Utc::now(),
            last_error: None,
        }
    }

    async fn close(mut self, reason: &str) {
        let uptime = Utc::now().signed_duration_since(self.opened_at).num_seconds();
        debug!(
            "[Realtime] closing channel ({}) after {}s, last error: {:?}",
            reason, uptime, self.last_error
        );
        if let Err(e) = self.channel.close().await {
            warn!("[Realtime] error while closing channel: {}", e);
        }
    }
}

/// What woke the listen loop up.
enum LoopEvent {
    Cancelled,
    RotationRequested,
    RotationDue,
    PostChallengeRotationDue,
    Item(Result<StreamMessage, StreamError>),
    Ended,
}

enum Recovery {
    Reconnect,
    Stop(StreamOutcome),
}

/// Cloneable view onto a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    rotate_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Asks for an immediate rotation. Requests made while one is already
    /// pending collapse into it. Returns `false` once the supervisor is gone.
    pub fn request_rotation(&self) -> bool {
        match self.rotate_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_rx.clone()
    }

    /// Resolves once the supervisor reaches `target`.
    pub async fn wait_for(&mut self, target: SupervisorState) -> Result<(), Error> {
        self.state_rx
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::Platform("stream supervisor dropped".into()))
    }
}

pub struct StreamSupervisor {
    connector: Arc<dyn RealtimeConnector>,
    clearer: Arc<dyn ChallengeClearer>,
    router: Arc<dyn EventRouter>,
    store: Arc<dyn CredentialStore>,
    settings: StreamSettings,
    classifier: ErrorClassifier,
    filtered: HashSet<String>,
    tracker: TransientTracker,
    cancel: CancellationToken,
    state_tx: watch::Sender<SupervisorState>,
    rotate_tx: mpsc::Sender<()>,
    rotate_rx: mpsc::Receiver<()>,
}

impl StreamSupervisor {
    pub fn new(
        connector: Arc<dyn RealtimeConnector>,
        clearer: Arc<dyn ChallengeClearer>,
        router: Arc<dyn EventRouter>,
        store: Arc<dyn CredentialStore>,
        settings: StreamSettings,
        classifier: ErrorClassifier,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Stopped);
        let (rotate_tx, rotate_rx) = mpsc::channel(1);
        let filtered = settings.filtered_event_types.iter().cloned().collect();
        let tracker = TransientTracker::new(settings.reconnect.clone());
        Self {
            connector,
            clearer,
            router,
            store,
            settings,
            classifier,
            filtered,
            tracker,
            cancel,
            state_tx,
            rotate_tx,
            rotate_rx,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            rotate_tx: self.rotate_tx.clone(),
            state_rx: self.state_tx.subscribe(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Runs until the session is rejected, a challenge cannot be cleared or
    /// the process is cancelled.
    ///
    /// Connect, listen and recover happen one after another in this task, so
    /// a new channel is only ever opened after the previous one was closed.
    pub async fn run(&mut self, session: SessionCredential) -> StreamOutcome {
        let mut session = session;
        let mut post_challenge: Option<Pin<Box<Sleep>>> = None;
        let period = self.settings.rotation_interval();

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break StreamOutcome::Cancelled;
            }
            self.set_state(SupervisorState::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break StreamOutcome::Cancelled,
                res = self.connector.open(&session) => res,
            };
            let mut conn = match opened {
                Ok(channel) => StreamConnection::new(channel),
                Err(e) => {
                    let class = match self.classifier.classify(&e) {
                        // Nothing to keep listening on; back off and retry.
                        ErrorClassification::Unknown => ErrorClassification::Transient,
                        other => other,
                    };
                    warn!("[Realtime] connect failed: {}", Error::from_stream(class, &e));
                    match self.recover(class, &session, &mut post_challenge).await {
                        Recovery::Reconnect => continue,
                        Recovery::Stop(outcome) => break outcome,
                    }
                }
            };

            session = conn.channel.session();
            if let Err(e) = self.store.save(&session).await {
                warn!("[Realtime] could not persist refreshed session: {}", e);
            }

            // Requests that arrived while connecting are satisfied by this
            // fresh channel.
            while self.rotate_rx.try_recv().is_ok() {}

            let mut rotation = interval_at(Instant::now() + period, period);
            rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.set_state(SupervisorState::Listening);
            info!("[Realtime] listening (next rotation in {}s)", period.as_secs());

            let step = loop {
                let event = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => LoopEvent::Cancelled,
                    Some(()) = self.rotate_rx.recv() => LoopEvent::RotationRequested,
                    _ = rotation.tick() => LoopEvent::RotationDue,
                    _ = wait_optional(&mut post_challenge) => LoopEvent::PostChallengeRotationDue,
                    item = conn.channel.next_item() => match item {
                        Some(item) => LoopEvent::Item(item),
                        None => LoopEvent::Ended,
                    },
                };

                match event {
                    LoopEvent::Cancelled => {
                        conn.close("shutdown").await;
                        break Recovery::Stop(StreamOutcome::Cancelled);
                    }
                    LoopEvent::RotationRequested | LoopEvent::RotationDue | LoopEvent::PostChallengeRotationDue => {
                        let reason = match event {
                            LoopEvent::RotationRequested => "requested",
                            LoopEvent::PostChallengeRotationDue => {
                                post_challenge = None;
                                "post-challenge"
                            }
                            _ => "scheduled",
                        };
                        info!("[Realtime] rotating channel ({})", reason);
                        self.set_state(SupervisorState::Rotating);
                        conn.close("rotation").await;
                        break Recovery::Reconnect;
                    }
                    LoopEvent::Item(Ok(msg)) => {
                        if self.filtered.contains(&msg.kind) {
                            trace!("[Realtime] dropped {} event", msg.kind);
                            continue;
                        }
                        self.router.route(msg).await;
                    }
                    LoopEvent::Item(Err(e)) => {
                        let class = self.classifier.classify(&e);
                        let classified = Error::from_stream(class, &e);
                        conn.last_error = Some(class);
                        if class == ErrorClassification::Unknown {
                            warn!("[Realtime] {}; keeping channel", classified);
                            continue;
                        }
                        warn!("[Realtime] {}", classified);
                        conn.close("error").await;
                        break self.recover(class, &session, &mut post_challenge).await;
                    }
                    LoopEvent::Ended => {
                        warn!("[Realtime] channel ended unexpectedly");
                        conn.close("ended").await;
                        break self
                            .recover(ErrorClassification::Transient, &session, &mut post_challenge)
                            .await;
                    }
                }
            };

            if let Recovery::Stop(outcome) = step {
                break outcome;
            }
        };

        self.set_state(SupervisorState::Stopped);
        info!("[Realtime] supervisor stopped: {:?}", outcome);
        outcome
    }

    /// Called with no channel open.
    async fn recover(
        &mut self,
        class: ErrorClassification,
        session: &SessionCredential,
        post_challenge: &mut Option<Pin<Box<Sleep>>>,
    ) -> Recovery {
        self.set_state(SupervisorState::Recovering);
        match class {
            ErrorClassification::Transient | ErrorClassification::Unknown => {
                let delay = self.tracker.next_delay(Instant::now());
                if delay.is_zero() {
                    info!("[Realtime] reconnecting immediately");
                    return Recovery::Reconnect;
                }
                warn!(
                    "[Realtime] {} failures within the window; reconnecting in {:?}",
                    self.tracker.recent_failures(),
                    delay
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => Recovery::Stop(StreamOutcome::Cancelled),
                    _ = sleep(delay) => Recovery::Reconnect,
                }
            }
            ErrorClassification::Challenge => {
                warn!("[Realtime] account flagged by an anti-automation warning; clearing it");
                let cleared = tokio::select! {
                    _ = self.cancel.cancelled() => return Recovery::Stop(StreamOutcome::Cancelled),
                    res = self.clearer.clear(session) => res,
                };
                match cleared {
                    Ok(true) => {
                        let delay = self.settings.post_challenge_rotation();
                        info!("[Realtime] warning cleared; extra rotation in {}s", delay.as_secs());
                        *post_challenge = Some(Box::pin(sleep(delay)));
                        Recovery::Reconnect
                    }
                    Ok(false) => {
                        error!("[Realtime] warning could not be cleared");
                        Recovery::Stop(StreamOutcome::ChallengeFailed)
                    }
                    Err(e) => {
                        error!("[Realtime] warning clearance failed: {}", e);
                        Recovery::Stop(StreamOutcome::ChallengeFailed)
                    }
                }
            }
            ErrorClassification::SessionInvalid => {
                error!("[Realtime] session is no longer accepted; handing back for re-authentication");
                Recovery::Stop(StreamOutcome::SessionInvalidated)
            }
        }
    }

    fn set_state(&self, state: SupervisorState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            debug!("[Realtime] state {:?} -> {:?}", prev, state);
        }
    }
}

async fn wait_optional(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}
