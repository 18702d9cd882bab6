//! Long-polling session over the Bot API.
//!
//! `connect` validates the token with `getMe`, restores the persisted update
//! offset from the credential store, then polls `getUpdates` in a spawned
//! task that reports `Open` / `Message` / `Closed` events.

use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teloxide::{prelude::*, types::AllowedUpdate, RequestError};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vdb_core::{
    config::Config,
    errors::{DisconnectReason, Error},
    session::{
        credentials::CredentialStore,
        port::{SessionConnector, SessionControl, SessionEvent, SessionHandle},
    },
    utils::iso_timestamp_utc,
    Result,
};

use crate::{
    mapping::{disconnect_reason, inbound_from_update},
    TelegramMessenger,
};

pub const SESSION_FILE: &str = "session.json";

const EVENT_BUFFER: usize = 64;

/// What survives a restart: which bot the state belongs to and where polling stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub bot_id: u64,
    pub offset: i32,
    pub saved_at: String,
}

/// Load the stored session for `bot_id`.
///
/// A file that cannot be parsed or belongs to another bot invalidates the
/// credentials.
pub fn load_session(store: &CredentialStore, bot_id: u64) -> Result<PersistedSession> {
    let loaded = store
        .load_json::<PersistedSession>(SESSION_FILE)
        .map_err(|e| Error::SessionAuthInvalid(format!("unreadable session state: {e}")))?;

    match loaded {
        None => Ok(PersistedSession {
            bot_id,
            offset: 0,
            saved_at: iso_timestamp_utc(),
        }),
        Some(s) if s.bot_id != bot_id => Err(Error::SessionAuthInvalid(format!(
            "session state belongs to bot {} (token is for bot {bot_id})",
            s.bot_id
        ))),
        Some(s) => Ok(s),
    }
}

fn save_session(store: &CredentialStore, bot_id: u64, offset: i32) -> Result<()> {
    store.save_json(
        SESSION_FILE,
        &PersistedSession {
            bot_id,
            offset,
            saved_at: iso_timestamp_utc(),
        },
    )
}

#[derive(Clone)]
pub struct TelegramConnector {
    bot: Bot,
    poll_timeout: Duration,
}

impl TelegramConnector {
    pub fn new(bot: Bot, poll_timeout: Duration) -> Self {
        Self { bot, poll_timeout }
    }

    /// Bot whose HTTP timeout outlasts a long poll.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(cfg.poll_timeout + Duration::from_secs(15))
            .build()
            .context("failed to build Telegram HTTP client")?;
        let bot = Bot::with_client(cfg.telegram_bot_token.clone(), client);
        Ok(Self::new(bot, cfg.poll_timeout))
    }
}

#[async_trait]
impl SessionConnector for TelegramConnector {
    async fn connect(&self, store: &CredentialStore) -> Result<SessionHandle> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| Error::SessionTransportDropped(disconnect_reason(&e)))?;
        let bot_id = me.user.id.0;

        let state = load_session(store, bot_id)?;
        save_session(store, bot_id, state.offset)?;
        info!(bot = %me.username(), offset = state.offset, "telegram session restored");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let offset = Arc::new(AtomicI32::new(state.offset));
        let stop = CancellationToken::new();

        let poller = Poller {
            bot: self.bot.clone(),
            store: store.clone(),
            bot_id,
            poll_timeout: self.poll_timeout,
            offset: offset.clone(),
            stop: stop.clone(),
            tx,
        };
        let task = tokio::spawn(poller.run());

        Ok(SessionHandle {
            events: rx,
            messenger: Arc::new(TelegramMessenger::new(self.bot.clone())),
            control: Arc::new(TelegramControl {
                bot: self.bot.clone(),
                store: store.clone(),
                bot_id,
                offset,
                stop,
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

struct Poller {
    bot: Bot,
    store: CredentialStore,
    bot_id: u64,
    poll_timeout: Duration,
    offset: Arc<AtomicI32>,
    stop: CancellationToken,
    tx: mpsc::Sender<SessionEvent>,
}

impl Poller {
    async fn run(self) {
        if self.tx.send(SessionEvent::Open).await.is_err() {
            return;
        }

        let timeout_secs = u32::try_from(self.poll_timeout.as_secs()).unwrap_or(u32::MAX);
        loop {
            let request = self
                .bot
                .get_updates()
                .offset(self.offset.load(Ordering::Acquire))
                .timeout(timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message]);

            let result = tokio::select! {
                _ = self.stop.cancelled() => return,
                r = request.send() => r,
            };

            match result {
                Ok(updates) => {
                    if updates.is_empty() {
                        continue;
                    }
                    for update in &updates {
                        self.offset.store(update.id + 1, Ordering::Release);
                        let Some(message) = inbound_from_update(update) else {
                            continue;
                        };
                        if self.tx.send(SessionEvent::Message(message)).await.is_err() {
                            return;
                        }
                    }
                    let offset = self.offset.load(Ordering::Acquire);
                    if let Err(e) = save_session(&self.store, self.bot_id, offset) {
                        warn!(error = %e, "failed to persist update offset");
                    }
                    debug!(count = updates.len(), offset, "processed updates");
                }
                Err(RequestError::RetryAfter(d)) => {
                    warn!(retry_after_secs = d.as_secs(), "polling rate limited");
                    tokio::select! {
                        _ = self.stop.cancelled() => return,
                        _ = sleep(d) => {}
                    }
                }
                Err(e) => {
                    let reason = disconnect_reason(&e);
                    let _ = self.tx.send(SessionEvent::Closed(reason)).await;
                    return;
                }
            }
        }
    }
}

struct TelegramControl {
    bot: Bot,
    store: CredentialStore,
    bot_id: u64,
    offset: Arc<AtomicI32>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SessionControl for TelegramControl {
    /// Stop polling, confirm processed updates with the server and persist
    /// the offset. The Bot API `logOut` method is never called: it would
    /// lock the bot out of the cloud API for ten minutes.
    async fn logout(&self) -> Result<()> {
        self.stop.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }

        let offset = self.offset.load(Ordering::Acquire);
        if offset > 0 {
            self.bot
                .get_updates()
                .offset(offset)
                .timeout(0)
                .limit(1)
                .send()
                .await
                .map_err(|e| {
                    Error::SessionTransportDropped(DisconnectReason::new(
                        disconnect_reason(&e).status_code,
                        format!("failed to acknowledge updates: {e}"),
                    ))
                })?;
        }

        save_session(&self.store, self.bot_id, offset)?;
        info!(offset, "telegram session closed");
        Ok(())
    }
}
