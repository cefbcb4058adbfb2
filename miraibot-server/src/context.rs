//! miraibot-server/src/context.rs
//!
//! Builds the bot's object graph from the command line and `config.json`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use miraibot_common::traits::auth_traits::TwoFactorInput;
use miraibot_core::auth::{
    AuthenticationCoordinator, ConsoleTwoFactorInput, HeadlessTwoFactorInput, HttpLoginClient, HttpSessionValidator,
};
use miraibot_core::eventbus::EventBus;
use miraibot_core::platforms::messenger::{ErrorClassifier, HttpChallengeClearer, StreamSupervisor, WebSocketConnector};
use miraibot_core::repositories::JsonFileCredentialStore;
use miraibot_core::{BotConfig, DefaultHttpClient, Error, HttpClient, SessionRuntime};

use crate::Args;

pub struct BotContext {
    pub config: BotConfig,
    pub event_bus: Arc<EventBus>,
    pub store: Arc<JsonFileCredentialStore>,
    pub runtime: SessionRuntime,
}

impl BotContext {
    pub async fn new(args: &Args, cancel: CancellationToken) -> Result<Self, Error> {
        let config = BotConfig::load(&args.config).await?;
        let credential_path = args
            .credential_path
            .clone()
            .unwrap_or_else(|| config.credential_path.clone());
        info!("Session credential file: {}", credential_path.display());

        let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new());
        let store = Arc::new(JsonFileCredentialStore::new(credential_path));
        let event_bus = Arc::new(EventBus::new());

        let two_factor: Arc<dyn TwoFactorInput> = if args.headless {
            Arc::new(HeadlessTwoFactorInput)
        } else {
            Arc::new(ConsoleTwoFactorInput::new())
        };

        let endpoints = &config.endpoints;
        let coordinator = AuthenticationCoordinator::new(
            store.clone(),
            Arc::new(HttpSessionValidator::new(http.clone(), endpoints.identity_url.clone())),
            Arc::new(HttpLoginClient::new(
                http.clone(),
                endpoints.login_url.clone(),
                endpoints.two_factor_url.clone(),
            )),
            two_factor,
            config.auth.clone(),
            cancel.clone(),
        );

        let supervisor = StreamSupervisor::new(
            Arc::new(WebSocketConnector::new(endpoints.realtime_url.clone())),
            Arc::new(HttpChallengeClearer::new(
                http.clone(),
                endpoints.challenge_url.clone(),
                endpoints.challenge_doc_id.clone(),
            )),
            event_bus.clone(),
            store.clone(),
            config.stream.clone(),
            ErrorClassifier::new(config.signatures.clone()),
            cancel.clone(),
        );

        Ok(Self {
            runtime: SessionRuntime::new(coordinator, supervisor, cancel),
            config,
            event_bus,
            store,
        })
    }
}
