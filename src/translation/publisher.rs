//! 翻訳進捗の配信。
//!
//! 全曲共通の1チャンネルに流し、購読側がイベント内の `songId` で絞り込む。

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::trace;

use super::events::TranslationProgressEvent;

const DEFAULT_CAPACITY: usize = 256;

pub trait ProgressPublisher: Send + Sync {
    /// Channel name the events are published on.
    fn channel(&self) -> &str;

    fn publish(&self, event: &TranslationProgressEvent) -> Result<()>;
}

/// `tokio::sync::broadcast` によるプロセス内 pub/sub。
///
/// 購読者がいない間の配信は捨てられる。
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    channel: String,
    sender: broadcast::Sender<String>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_capacity(channel, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(channel: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            channel: channel.into(),
            sender,
        }
    }

    /// Receives every serialized event published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl ProgressPublisher for BroadcastPublisher {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn publish(&self, event: &TranslationProgressEvent) -> Result<()> {
        let payload =
            serde_json::to_string(event).context("failed to serialize translation event")?;
        match self.sender.send(payload) {
            Ok(receivers) => trace!(channel = %self.channel, receivers, "published translation event"),
            Err(_) => trace!(channel = %self.channel, "no subscribers for translation event"),
        }
        Ok(())
    }
}
