//! src/eventbus/mod.rs
//!
//! In-process event bus. Inbound realtime messages are fanned out to every
//! subscriber through its own bounded MPSC queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::trace;

use miraibot_common::models::StreamMessage;
use miraibot_common::traits::stream_traits::EventRouter;

#[derive(Debug, Clone)]
pub enum BotEvent {
    /// A message that survived the supervisor's type filter.
    Message {
        message: StreamMessage,
        received_at: DateTime<Utc>,
    },

    /// Operational notices (startup banner, shutdown, ...).
    SystemMessage(String),
}

impl BotEvent {
    pub fn event_type(&self) -> &str {
        match self {
            BotEvent::Message { message, .. } => &message.kind,
            BotEvent::SystemMessage(_) => "system_message",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<BotEvent>`.
///
/// A full subscriber queue makes `publish` wait (backpressure). Subscribers
/// that dropped their receiver are pruned on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BotEvent>>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub const DEFAULT_BUFFER_SIZE: usize = 10000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: Arc::new(tx),
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<BotEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn publish(&self, event: BotEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        let mut closed = false;
        for s in senders {
            if s.send(event.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.subscribers.lock().await.retain(|s| !s.is_closed());
        }
    }

    pub async fn publish_system(&self, text: impl Into<String>) {
        self.publish(BotEvent::SystemMessage(text.into())).await;
    }
}

#[async_trait]
impl EventRouter for EventBus {
    async fn route(&self, message: StreamMessage) {
        trace!("routing {} event", message.kind);
        self.publish(BotEvent::Message {
            message,
            received_at: Utc::now(),
        })
        .await;
    }
}
