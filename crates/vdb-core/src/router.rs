//! Inbound message routing: static replies inline, downloads as gated jobs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    commands::{
        help_text, info_text, missing_url_text, parse_command, queue_full_text, welcome_text,
        Command, UNKNOWN_COMMAND_TEXT,
    },
    domain::{ChatId, DownloadRequest},
    jobs::{Admission, JobGate},
    messaging::{port::MessagingPort, types::InboundMessage},
    pipeline::{DeliveryPipeline, PipelineOutcome},
    session::port::InboundHandler,
};

pub struct CommandRouter {
    pipeline: Arc<DeliveryPipeline>,
    gate: Arc<JobGate>,
}

impl CommandRouter {
    pub fn new(pipeline: Arc<DeliveryPipeline>, gate: Arc<JobGate>) -> Self {
        Self { pipeline, gate }
    }

    /// Route one message. Returns the spawned job when a download was admitted.
    pub async fn dispatch(
        &self,
        message: InboundMessage,
        messenger: Arc<dyn MessagingPort>,
    ) -> Option<JoinHandle<PipelineOutcome>> {
        let command = parse_command(&message.text)?;
        let chat_id = message.chat_id;
        info!(
            chat_id = chat_id.0,
            user_id = message.user_id.map(|u| u.0),
            username = message.username.as_deref().unwrap_or(""),
            command = ?command,
            "command received"
        );

        let reply = match command {
            Command::Start => welcome_text(),
            Command::Help => help_text(),
            Command::Info => info_text(messenger.capabilities().transport_name),
            Command::Unknown(_) => UNKNOWN_COMMAND_TEXT.to_string(),
            Command::Download { platform, url: None } => missing_url_text(platform),
            Command::Download {
                platform,
                url: Some(url),
            } => {
                let request = DownloadRequest::new(platform, url);
                match self.gate.admit(chat_id).await {
                    Admission::Admitted(ticket) => {
                        debug!(
                            chat_id = chat_id.0,
                            queued = self.gate.pending(chat_id),
                            "download admitted"
                        );
                        let pipeline = self.pipeline.clone();
                        return Some(tokio::spawn(ticket.run(async move {
                            pipeline.run(chat_id, &request, messenger.as_ref()).await
                        })));
                    }
                    Admission::QueueFull { queued } => {
                        debug!(chat_id = chat_id.0, queued, "download rejected: queue full");
                        queue_full_text(queued)
                    }
                }
            }
        };

        send_reply(messenger.as_ref(), chat_id, &reply).await;
        None
    }
}

async fn send_reply(messenger: &dyn MessagingPort, chat_id: ChatId, text: &str) {
    if let Err(e) = messenger.send_text(chat_id, text).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}

#[async_trait]
impl InboundHandler for CommandRouter {
    async fn handle(&self, message: InboundMessage, messenger: Arc<dyn MessagingPort>) {
        // Jobs run detached; the session loop keeps receiving.
        let _ = self.dispatch(message, messenger).await;
    }
}
