//! Long-lived messenger session with reconnect handling.
//!
//! A single [`SessionManager`] task owns the connection and its retry
//! counter. States move `Disconnected -> Connecting -> Open`; a drop goes back
//! to `Disconnected`, a logout to `LoggedOut` (credentials are wiped before
//! the next `Connecting`).

pub mod credentials;
pub mod policy;
pub mod port;

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    errors::{DisconnectReason, Error},
    Result,
};

use credentials::CredentialStore;
use policy::{ReconnectDecision, ReconnectPolicy, RetryState};
use port::{InboundHandler, SessionConnector, SessionControl, SessionEvent, SessionHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    LoggedOut,
}

#[derive(Clone, Debug)]
pub struct SessionTimeouts {
    pub connect: Duration,
    pub logout: Duration,
}

impl SessionTimeouts {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            connect: cfg.connect_timeout,
            logout: cfg.logout_timeout,
        }
    }
}

enum Drive {
    Shutdown,
    Closed(DisconnectReason),
}

pub struct SessionManager {
    connector: Arc<dyn SessionConnector>,
    store: CredentialStore,
    policy: ReconnectPolicy,
    timeouts: SessionTimeouts,
    handler: Arc<dyn InboundHandler>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        store: CredentialStore,
        policy: ReconnectPolicy,
        timeouts: SessionTimeouts,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            store,
            policy,
            timeouts,
            handler,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Connect, serve and reconnect until `shutdown` fires.
    ///
    /// Returns an error only when the credential directory cannot be managed.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut retry = RetryState::default();

        while !shutdown.is_cancelled() {
            self.store.ensure()?;
            self.set_state(SessionState::Connecting);
            info!("connecting to messenger");

            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = tokio::time::timeout(self.timeouts.connect, self.connector.connect(&self.store)) => r,
            };

            let decision = match connected {
                Ok(Ok(handle)) => match self.drive(handle, &mut retry, &shutdown).await {
                    Drive::Shutdown => break,
                    Drive::Closed(reason) => {
                        warn!(reason = %reason, "connection closed");
                        self.policy.decide(&mut retry, &reason)
                    }
                },
                Ok(Err(e)) => {
                    warn!(error = %e, "connection attempt failed");
                    self.policy.decide_connect_error(&mut retry, &e)
                }
                Err(_) => {
                    let e = Error::SessionTransportDropped(DisconnectReason::new(
                        Some(408),
                        "connect timed out",
                    ));
                    warn!(error = %e, "connection attempt failed");
                    self.policy.decide_connect_error(&mut retry, &e)
                }
            };

            match decision {
                ReconnectDecision::Retry { attempt, delay } => {
                    self.set_state(SessionState::Disconnected);
                    info!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "reconnecting"
                    );
                }
                ReconnectDecision::WipeCredentials { delay, logged_out } => {
                    if logged_out {
                        self.set_state(SessionState::LoggedOut);
                        warn!("logged out; clearing credentials");
                    } else {
                        self.set_state(SessionState::Disconnected);
                        warn!("clearing credentials and retrying from a clean state");
                    }
                    if let Err(e) = self.store.wipe() {
                        error!(error = %e, "failed to clear credentials");
                        return Err(e);
                    }
                    info!(delay_ms = delay.as_millis() as u64, "reconnecting");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(decision.delay()) => {}
            }
        }

        self.set_state(SessionState::Disconnected);
        info!("session stopped");
        Ok(())
    }

    async fn drive(
        &self,
        handle: SessionHandle,
        retry: &mut RetryState,
        shutdown: &CancellationToken,
    ) -> Drive {
        let SessionHandle {
            mut events,
            messenger,
            control,
        } = handle;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.logout(control.as_ref()).await;
                    return Drive::Shutdown;
                }
                ev = events.recv() => match ev {
                    Some(SessionEvent::Open) => {
                        retry.reset();
                        self.set_state(SessionState::Open);
                        info!("connected");
                    }
                    Some(SessionEvent::Message(msg)) => {
                        self.handler.handle(msg, messenger.clone()).await;
                    }
                    Some(SessionEvent::Closed(reason)) => return Drive::Closed(reason),
                    None => {
                        return Drive::Closed(DisconnectReason::new(None, "event stream ended"));
                    }
                }
            }
        }
    }

    async fn logout(&self, control: &dyn SessionControl) {
        info!("logging out");
        match tokio::time::timeout(self.timeouts.logout, control.logout()).await {
            Ok(Ok(())) => info!("logged out"),
            Ok(Err(e)) => warn!(error = %e, "logout failed"),
            Err(_) => warn!(
                timeout_ms = self.timeouts.logout.as_millis() as u64,
                "logout timed out"
            ),
        }
    }
}
