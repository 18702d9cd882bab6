//! Telegram adapter (teloxide).
//!
//! Implements the core `SessionConnector` (long polling) and `MessagingPort`
//! over the Telegram Bot API.

use std::path::Path;

use async_trait::async_trait;
use teloxide::{prelude::*, types::InputFile};
use tokio::time::sleep;
use tracing::warn;

pub mod mapping;
pub mod session;

pub use session::TelegramConnector;

use vdb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

/// Bot API upload ceiling for `sendVideo`.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(e.to_string())
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(retry_after_secs = d.as_secs(), "telegram rate limit; retrying");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Cut `text` to at most `max` characters.
fn clamp_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            transport_name: "Telegram",
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let text = clamp_text(text, MAX_MESSAGE_LEN);
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.clone()))
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_video(&self, chat_id: ChatId, path: &Path, caption: &str) -> Result<MessageRef> {
        let caption = clamp_text(caption, 1024);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_video(Self::tg_chat(chat_id), InputFile::file(path.to_path_buf()))
                    .caption(caption.clone())
                    .supports_streaming(true)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}
