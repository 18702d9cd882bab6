use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{MessagingCapabilities, OutboundPayload},
    Result,
};

/// Outbound side of a messenger session.
///
/// The shape is designed so other adapters (WhatsApp/Discord) can fit behind
/// the same interface with capability flags.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Upload a local video file with a caption.
    async fn send_video(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<MessageRef>;

    async fn send(&self, chat_id: ChatId, payload: &OutboundPayload) -> Result<MessageRef> {
        match payload {
            OutboundPayload::Text(text) => self.send_text(chat_id, text).await,
            OutboundPayload::Video { path, caption } => {
                self.send_video(chat_id, path, caption).await
            }
        }
    }
}
