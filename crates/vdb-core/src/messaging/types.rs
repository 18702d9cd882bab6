use std::path::PathBuf;

use crate::domain::{ChatId, UserId};

/// Cross-messenger inbound message.
///
/// Backend-specific fields should live in the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub text: String,
}

/// What the bot can send back to a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Video { path: PathBuf, caption: String },
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Human name used in captions ("Compressed for Telegram").
    pub transport_name: &'static str,
    /// Largest attachment the backend accepts, in bytes.
    pub max_upload_bytes: u64,
}
