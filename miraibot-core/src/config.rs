//! Bot configuration loaded from `config.json`.
//!
//! Every field has a default, so a missing file (or a partial one) still
//! yields a usable configuration. Secrets never live here; they are read from
//! the environment when an interactive login actually happens.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::Error;
use crate::platforms::messenger::backoff::ReconnectPolicy;
use crate::platforms::messenger::classify::SignatureTable;
use miraibot_common::models::AccountSecrets;

pub const ACCOUNT_ID_ENV: &str = "FB_EMAIL";
pub const ACCOUNT_SECRET_ENV: &str = "FB_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot_name: Option<String>,
    pub prefix: Option<String>,
    pub credential_path: PathBuf,
    pub auth: AuthSettings,
    pub stream: StreamSettings,
    pub signatures: SignatureTable,
    pub endpoints: Endpoints,
    pub watchdog: WatchdogSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: None,
            prefix: None,
            credential_path: PathBuf::from("appstate.json"),
            auth: AuthSettings::default(),
            stream: StreamSettings::default(),
            signatures: SignatureTable::default(),
            endpoints: Endpoints::default(),
            watchdog: WatchdogSettings::default(),
        }
    }
}

impl BotConfig {
    /// Reads `path`; a missing file gives the defaults.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}; using defaults.", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let cfg = Self::from_json(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Config loaded from {}", path.display());
        Ok(cfg)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let cfg: BotConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.stream.rotation_interval_secs == 0 {
            return Err(Error::Config("stream.rotation_interval_secs must be > 0".into()));
        }
        if self.watchdog.sample_interval_secs == 0 {
            return Err(Error::Config("watchdog.sample_interval_secs must be > 0".into()));
        }
        self.endpoints.validate()
    }
}

impl Endpoints {
    fn validate(&self) -> Result<(), Error> {
        let http_urls = [
            ("login_url", &self.login_url),
            ("two_factor_url", &self.two_factor_url),
            ("identity_url", &self.identity_url),
            ("challenge_url", &self.challenge_url),
        ];
        for (name, raw) in http_urls {
            let parsed = Url::parse(raw)
                .map_err(|e| Error::Config(format!("endpoints.{name}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!("endpoints.{name} must be http(s)")));
            }
        }
        let realtime = Url::parse(&self.realtime_url)
            .map_err(|e| Error::Config(format!("endpoints.realtime_url: {e}")))?;
        if !matches!(realtime.scheme(), "ws" | "wss") {
            return Err(Error::Config("endpoints.realtime_url must be ws(s)".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Full authentication cycles allowed per process.
    pub max_attempts: u32,
    pub two_factor_timeout_secs: u64,
    /// Wrong 2FA codes tolerated inside a single login.
    pub max_two_factor_prompts: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            two_factor_timeout_secs: 300,
            max_two_factor_prompts: 3,
        }
    }
}

impl AuthSettings {
    pub fn two_factor_timeout(&self) -> Duration {
        Duration::from_secs(self.two_factor_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub rotation_interval_secs: u64,
    /// Delay of the extra rotation scheduled after a cleared challenge.
    pub post_challenge_rotation_secs: u64,
    /// Event types dropped before routing.
    pub filtered_event_types: Vec<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            rotation_interval_secs: 3 * 60 * 60,
            post_challenge_rotation_secs: 10 * 60,
            filtered_event_types: vec![
                "presence".to_string(),
                "typ".to_string(),
                "read_receipt".to_string(),
            ],
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StreamSettings {
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn post_challenge_rotation(&self) -> Duration {
        Duration::from_secs(self.post_challenge_rotation_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login_url: String,
    pub two_factor_url: String,
    pub identity_url: String,
    pub challenge_url: String,
    pub challenge_doc_id: String,
    pub realtime_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_url: "http://127.0.0.1:8089/login".to_string(),
            two_factor_url: "http://127.0.0.1:8089/login/approve".to_string(),
            identity_url: "https://www.facebook.com/me".to_string(),
            challenge_url: "https://www.facebook.com/api/graphql/".to_string(),
            challenge_doc_id: "6339492849481770".to_string(),
            realtime_url: "ws://127.0.0.1:8089/realtime".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub enabled: bool,
    pub threshold_mb: u64,
    pub sample_interval_secs: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_mb: 500,
            sample_interval_secs: 10,
        }
    }
}

impl WatchdogSettings {
    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_mb.saturating_mul(1024 * 1024)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }
}

/// Reads the account identifier and secret from the environment.
pub fn account_secrets_from_env() -> Result<AccountSecrets, Error> {
    let identifier = std::env::var(ACCOUNT_ID_ENV).unwrap_or_default();
    let secret = std::env::var(ACCOUNT_SECRET_ENV).unwrap_or_default();
    if identifier.is_empty() || secret.is_empty() {
        return Err(Error::FatalAuth(format!(
            "{} and {} must be set for interactive login",
            ACCOUNT_ID_ENV, ACCOUNT_SECRET_ENV
        )));
    }
    Ok(AccountSecrets::new(identifier, secret))
}
