// File: src/auth/two_factor.rs

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::Error;
use miraibot_common::models::TwoFactorChallenge;
use miraibot_common::traits::auth_traits::TwoFactorInput;

type LineSource = Box<dyn AsyncRead + Send + Unpin>;

/// Reads 2FA codes from the process's standard input, one line per
/// challenge.
///
/// Lines are read by a background task and handed over through a channel,
/// so a prompt abandoned by a timeout or cancellation never loses a
/// half-typed code.
pub struct ConsoleTwoFactorInput {
    feed: Mutex<LineFeed>,
}

struct LineFeed {
    // Taken on the first prompt; stdin is not touched before that.
    source: Option<LineSource>,
    lines: Option<mpsc::Receiver<String>>,
}

impl ConsoleTwoFactorInput {
    pub fn new() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            feed: Mutex::new(LineFeed {
                source: Some(Box::new(reader)),
                lines: None,
            }),
        }
    }
}

impl Default for ConsoleTwoFactorInput {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_line_reader(source: LineSource) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        let mut lines = BufReader::new(source).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("2FA input read failed: {}", e);
                    break;
                }
            }
        }
        debug!("2FA input reader finished.");
    });
    rx
}

#[async_trait]
impl TwoFactorInput for ConsoleTwoFactorInput {
    async fn read_code(&self, challenge: &TwoFactorChallenge) -> Result<String, Error> {
        warn!("{}:", challenge.message);
        let mut feed = self.feed.lock().await;
        if let Some(source) = feed.source.take() {
            feed.lines = Some(spawn_line_reader(source));
        }
        let line = match feed.lines.as_mut() {
            Some(lines) => lines.recv().await,
            None => None,
        };
        match line {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(Error::Auth("standard input closed while waiting for 2FA code".into())),
        }
    }
}

/// For runs without an operator: any 2FA prompt fails the login for good.
#[derive(Default)]
pub struct HeadlessTwoFactorInput;

#[async_trait]
impl TwoFactorInput for HeadlessTwoFactorInput {
    async fn read_code(&self, _challenge: &TwoFactorChallenge) -> Result<String, Error> {
        Err(Error::FatalAuth(
            "two-factor approval required but running headless".into(),
        ))
    }
}
