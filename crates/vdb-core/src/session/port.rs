use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    errors::DisconnectReason,
    messaging::{port::MessagingPort, types::InboundMessage},
    session::credentials::CredentialStore,
    Result,
};

/// Lifecycle and traffic events emitted by a live connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Open,
    Message(InboundMessage),
    Closed(DisconnectReason),
}

/// One live connection, as returned by [`SessionConnector::connect`].
pub struct SessionHandle {
    pub events: mpsc::Receiver<SessionEvent>,
    pub messenger: Arc<dyn MessagingPort>,
    pub control: Arc<dyn SessionControl>,
}

/// Opens connections to a messaging backend.
///
/// Errors: `SessionAuthInvalid` when the stored credentials cannot be used
/// (they will be wiped); anything else is treated as transient.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, store: &CredentialStore) -> Result<SessionHandle>;
}

#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Graceful shutdown of the live connection.
    async fn logout(&self) -> Result<()>;
}

/// Receives inbound messages. Must return quickly; long work is spawned.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage, messenger: Arc<dyn MessagingPort>);
}
