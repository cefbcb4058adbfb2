// tests/session_tests.rs

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use miraibot_common::models::{StreamError, SupervisorState};
use miraibot_core::auth::AuthenticationCoordinator;
use miraibot_core::config::{AuthSettings, StreamSettings};
use miraibot_core::platforms::messenger::{ErrorClassifier, StreamSupervisor};
use miraibot_core::{Error, RunOutcome, SessionRuntime};

use test_utils::*;

struct Parts {
    runtime: SessionRuntime,
    store: Arc<MemoryCredentialStore>,
    validator: Arc<FakeValidator>,
    login: Arc<FakeLoginClient>,
    connector: Arc<FakeConnector>,
    feeds: tokio::sync::mpsc::UnboundedReceiver<ChannelFeed>,
    cancel: CancellationToken,
}

fn build(store: MemoryCredentialStore, validator: FakeValidator, login: FakeLoginClient, clearer: FakeClearer) -> Parts {
    let store = Arc::new(store);
    let validator = Arc::new(validator);
    let login = Arc::new(login);
    let (connector, feeds) = FakeConnector::new();
    let (router, _routed) = RecordingRouter::new();
    let cancel = CancellationToken::new();

    let coordinator = AuthenticationCoordinator::new(
        store.clone(),
        validator.clone(),
        login.clone(),
        Arc::new(FakeTwoFactor::silent()),
        AuthSettings::default(),
        cancel.clone(),
    )
    .with_secrets(secrets);
    let supervisor = StreamSupervisor::new(
        connector.clone(),
        Arc::new(clearer),
        router,
        store.clone(),
        StreamSettings::default(),
        ErrorClassifier::default(),
        cancel.clone(),
    );

    Parts {
        runtime: SessionRuntime::new(coordinator, supervisor, cancel.clone()),
        store,
        validator,
        login,
        connector,
        feeds,
        cancel,
    }
}

#[tokio::test(start_paused = true)]
async fn not_logged_in_triggers_a_fresh_login() {
    let mut parts = build(
        MemoryCredentialStore::with(session("cached")),
        FakeValidator::accepting(&["cached"]),
        FakeLoginClient::default(),
        FakeClearer::returning(true),
    );
    let mut handle = parts.runtime.supervisor_handle();
    let mut runtime = parts.runtime;
    let task = tokio::spawn(async move { runtime.run().await });

    let first = parts.feeds.recv().await.unwrap();
    assert_eq!(first.session.cookie("xs"), Some("cached"));
    assert_eq!(parts.login.logins(), 0);

    // The platform now rejects the cached cookies everywhere.
    parts.validator.reject_all();
    first.error(StreamError::from_payload(serde_json::json!({"error": 1357001, "errorSummary": "Not logged in."})));

    let second = parts.feeds.recv().await.unwrap();
    assert_eq!(second.session.cookie("xs"), Some("fresh-1"));
    assert_eq!(parts.login.logins(), 1);
    handle.wait_for(SupervisorState::Listening).await.unwrap();
    assert_eq!(parts.store.current().unwrap().cookie("xs"), Some("fresh-1"));

    parts.cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), RunOutcome::Stopped);
    assert_eq!(parts.connector.ledger.live(), 0);
    assert_eq!(parts.connector.ledger.max_live(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_challenge_ends_the_run() {
    let mut parts = build(
        MemoryCredentialStore::default(),
        FakeValidator::default(),
        FakeLoginClient::default(),
        FakeClearer::returning(false),
    );
    let mut runtime = parts.runtime;
    let task = tokio::spawn(async move { runtime.run().await });

    let feed = parts.feeds.recv().await.unwrap();
    feed.error(StreamError::new("checkpoint").with_code("601051028565049"));

    assert_eq!(task.await.unwrap().unwrap(), RunOutcome::ChallengeFailed);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_is_returned_to_the_caller() {
    let parts = build(
        MemoryCredentialStore::default(),
        FakeValidator::default(),
        FakeLoginClient::scripted(vec![Err(Error::FatalAuth("wrong-password".into()))]),
        FakeClearer::returning(true),
    );
    let mut runtime = parts.runtime;

    let err = runtime.run().await.unwrap_err();
    assert!(matches!(err, Error::FatalAuth(_)));
    assert_eq!(parts.connector.ledger.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_start_stops_cleanly() {
    let parts = build(
        MemoryCredentialStore::with(session("cached")),
        FakeValidator::accepting(&["cached"]),
        FakeLoginClient::default(),
        FakeClearer::returning(true),
    );
    parts.cancel.cancel();
    let mut runtime = parts.runtime;

    assert_eq!(runtime.run().await.unwrap(), RunOutcome::Stopped);
    assert_eq!(parts.connector.ledger.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn fresh_process_logs_in_and_reaches_listening() {
    use miraibot_core::repositories::{CredentialStore, JsonFileCredentialStore};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appstate.json");
    let store = Arc::new(JsonFileCredentialStore::new(path.clone()));
    let login = Arc::new(FakeLoginClient::default());
    let (connector, mut feeds) = FakeConnector::new();
    let (router, _routed) = RecordingRouter::new();
    let cancel = CancellationToken::new();

    let coordinator = AuthenticationCoordinator::new(
        store.clone(),
        Arc::new(FakeValidator::default()),
        login.clone(),
        Arc::new(FakeTwoFactor::silent()),
        AuthSettings::default(),
        cancel.clone(),
    )
    .with_secrets(secrets);
    let supervisor = StreamSupervisor::new(
        connector.clone(),
        Arc::new(FakeClearer::returning(true)),
        router,
        store.clone(),
        StreamSettings::default(),
        ErrorClassifier::default(),
        cancel.clone(),
    );
    let mut runtime = SessionRuntime::new(coordinator, supervisor, cancel.clone());
    let mut handle = runtime.supervisor_handle();
    let task = tokio::spawn(async move { runtime.run().await });

    let _feed = feeds.recv().await.unwrap();
    handle.wait_for(SupervisorState::Listening).await.unwrap();

    assert_eq!(login.logins(), 1);
    let on_disk = store.load().await.unwrap().expect("credential file written");
    assert_eq!(on_disk.cookie("xs"), Some("fresh-1"));
    assert_eq!(on_disk.cookie("presence"), Some("p1"));
    assert!(path.exists());

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), RunOutcome::Stopped);
}

#[tokio::test(start_paused = true)]
async fn sessions_rejected_at_every_handshake_exhaust_the_budget() {
    let parts = build(
        MemoryCredentialStore::default(),
        FakeValidator::default(),
        FakeLoginClient::default(),
        FakeClearer::returning(true),
    );
    for _ in 0..50 {
        parts
            .connector
            .fail_next_open(StreamError::new("handshake rejected with HTTP 401").with_code("HTTP401"));
    }
    let mut runtime = parts.runtime;

    let result = tokio::time::timeout(Duration::from_secs(5), runtime.run())
        .await
        .expect("run must end once the budget is spent");
    let err = result.unwrap_err();
    assert!(matches!(err, Error::AuthExhausted { attempts: 3 }), "got {err:?}");
    assert_eq!(parts.login.logins(), 3);
    assert_eq!(parts.connector.ledger.opens(), 0);
    assert!(parts.store.current().is_none());
}
