// File: miraibot-core/tests/test_utils/mod.rs
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use miraibot_common::models::{
    AccountSecrets, LoginOutcome, SessionCookie, SessionCredential, StreamError, StreamMessage,
    TwoFactorChallenge,
};
use miraibot_common::traits::auth_traits::{LoginClient, SessionValidator, TwoFactorInput};
use miraibot_common::traits::repository_traits::CredentialStore;
use miraibot_common::traits::stream_traits::{ChallengeClearer, EventRouter, RealtimeChannel, RealtimeConnector};
use miraibot_core::Error;

pub fn session(tag: &str) -> SessionCredential {
    SessionCredential::new(vec![
        SessionCookie::new("c_user", "100042", "facebook.com"),
        SessionCookie::new("xs", tag, "facebook.com"),
    ])
}

pub fn secrets() -> Result<AccountSecrets, Error> {
    Ok(AccountSecrets::new("bot@example.test", "hunter2"))
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<SessionCredential>>,
    pub saves: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn with(credential: SessionCredential) -> Self {
        let store = Self::default();
        *store.slot.lock().unwrap() = Some(credential);
        store
    }

    pub fn current(&self) -> Option<SessionCredential> {
        self.slot.lock().unwrap().clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<SessionCredential>, Error> {
        Ok(self.current())
    }

    async fn save(&self, credential: &SessionCredential) -> Result<(), Error> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<bool, Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self.slot.lock().unwrap().take().is_some())
    }
}

// ---------------------------------------------------------------------------
// Auth collaborators
// ---------------------------------------------------------------------------

/// Accepts exactly the sessions whose `xs` cookie is in `accepted`.
#[derive(Default)]
pub struct FakeValidator {
    accepted: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeValidator {
    pub fn accepting(tags: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(tags.iter().map(|t| t.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn accept(&self, tag: &str) {
        self.accepted.lock().unwrap().push(tag.to_string());
    }

    pub fn reject_all(&self) {
        self.accepted.lock().unwrap().clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionValidator for FakeValidator {
    async fn validate(&self, credential: &SessionCredential) -> Result<bool, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tag = credential.cookie("xs").unwrap_or_default();
        Ok(self.accepted.lock().unwrap().iter().any(|t| t == tag))
    }
}

/// Replays scripted login outcomes; once the script runs dry every login
/// succeeds with `session("fresh-N")`.
#[derive(Default)]
pub struct FakeLoginClient {
    script: Mutex<VecDeque<Result<LoginOutcome, Error>>>,
    two_factor_script: Mutex<VecDeque<Result<LoginOutcome, Error>>>,
    pub logins: AtomicUsize,
    pub codes: Mutex<Vec<String>>,
}

impl FakeLoginClient {
    pub fn scripted(outcomes: Vec<Result<LoginOutcome, Error>>) -> Self {
        let client = Self::default();
        *client.script.lock().unwrap() = outcomes.into();
        client
    }

    pub fn with_two_factor(self, outcomes: Vec<Result<LoginOutcome, Error>>) -> Self {
        *self.two_factor_script.lock().unwrap() = outcomes.into();
        self
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginClient for FakeLoginClient {
    async fn login(&self, _account: &AccountSecrets) -> Result<LoginOutcome, Error> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LoginOutcome::Success(session(&format!("fresh-{n}")))))
    }

    async fn submit_two_factor(&self, _challenge: &TwoFactorChallenge, code: &str) -> Result<LoginOutcome, Error> {
        self.codes.lock().unwrap().push(code.to_string());
        self.two_factor_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(LoginOutcome::Success(session("after-2fa"))))
    }
}

/// Hands out queued codes; with an empty queue it never answers.
#[derive(Default)]
pub struct FakeTwoFactor {
    codes: Mutex<VecDeque<String>>,
    pub prompts: AtomicUsize,
}

impl FakeTwoFactor {
    pub fn answering(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TwoFactorInput for FakeTwoFactor {
    async fn read_code(&self, _challenge: &TwoFactorChallenge) -> Result<String, Error> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let next = self.codes.lock().unwrap().pop_front();
        match next {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Realtime collaborators
// ---------------------------------------------------------------------------

type Item = Result<StreamMessage, StreamError>;

/// Test-side end of one fake channel. Dropping it ends the channel.
pub struct ChannelFeed {
    pub id: usize,
    pub session: SessionCredential,
    tx: mpsc::UnboundedSender<Item>,
}

impl ChannelFeed {
    pub fn message(&self, kind: &str) {
        let _ = self.tx.send(Ok(StreamMessage::new(kind)));
    }

    pub fn error(&self, err: StreamError) {
        let _ = self.tx.send(Err(err));
    }
}

/// Shared bookkeeping of every channel the connector handed out.
#[derive(Default)]
pub struct ChannelLedger {
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub opens: AtomicUsize,
    pub events: Mutex<Vec<String>>,
}

impl ChannelLedger {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

pub struct FakeConnector {
    pub ledger: Arc<ChannelLedger>,
    open_failures: Mutex<VecDeque<StreamError>>,
    feeds: mpsc::UnboundedSender<ChannelFeed>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ChannelFeed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            ledger: Arc::new(ChannelLedger::default()),
            open_failures: Mutex::new(VecDeque::new()),
            feeds: tx,
        });
        (connector, rx)
    }

    pub fn fail_next_open(&self, err: StreamError) {
        self.open_failures.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn open(&self, session: &SessionCredential) -> Result<Box<dyn RealtimeChannel>, StreamError> {
        if let Some(err) = self.open_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let id = self.ledger.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.ledger.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.max_live.fetch_max(live, Ordering::SeqCst);
        self.ledger.events.lock().unwrap().push(format!("open#{id}"));

        // The handshake rotates the `presence` cookie on every connect.
        let mut refreshed = session.clone();
        refreshed.merge(vec![SessionCookie::new("presence", format!("p{id}"), "facebook.com")]);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.feeds.send(ChannelFeed {
            id,
            session: session.clone(),
            tx,
        });
        Ok(Box::new(FakeChannel {
            id,
            rx,
            closed: false,
            session: refreshed,
            ledger: self.ledger.clone(),
        }))
    }
}

struct FakeChannel {
    id: usize,
    rx: mpsc::UnboundedReceiver<Item>,
    closed: bool,
    session: SessionCredential,
    ledger: Arc<ChannelLedger>,
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn next_item(&mut self) -> Option<Item> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<(), Error> {
        if !self.closed {
            self.closed = true;
            self.ledger.live.fetch_sub(1, Ordering::SeqCst);
            self.ledger.events.lock().unwrap().push(format!("close#{}", self.id));
        }
        Ok(())
    }

    fn session(&self) -> SessionCredential {
        self.session.clone()
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        if !self.closed {
            self.ledger.live.fetch_sub(1, Ordering::SeqCst);
            self.ledger.events.lock().unwrap().push(format!("leak#{}", self.id));
        }
    }
}

pub struct FakeClearer {
    result: Mutex<Result<bool, String>>,
    pub calls: AtomicUsize,
}

impl FakeClearer {
    pub fn returning(cleared: bool) -> Self {
        Self {
            result: Mutex::new(Ok(cleared)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            result: Mutex::new(Err(msg.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeClearer for FakeClearer {
    async fn clear(&self, _session: &SessionCredential) -> Result<bool, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone().map_err(Error::Platform)
    }
}

pub struct RecordingRouter {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl RecordingRouter {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<StreamMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl EventRouter for RecordingRouter {
    async fn route(&self, message: StreamMessage) {
        let _ = self.tx.send(message);
    }
}
