//! Reconnect policy: what to do after a connection goes away.

use std::time::Duration;

use crate::{
    config::Config,
    errors::{DisconnectReason, Error},
};

#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Disconnect codes that mean "stored credentials are unusable".
    pub wipe_codes: Vec<u16>,
    pub logged_out_code: u16,
    pub wipe_restart_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            wipe_codes: vec![405, 428],
            logged_out_code: 401,
            wipe_restart_delay: Duration::from_millis(1_000),
        }
    }
}

/// Consecutive failed attempts since the last successful open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
}

impl RetryState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry {
        attempt: u32,
        delay: Duration,
    },
    /// Wipe stored credentials, then reconnect after `delay`.
    WipeCredentials { delay: Duration, logged_out: bool },
}

impl ReconnectDecision {
    pub fn delay(&self) -> Duration {
        match self {
            ReconnectDecision::Retry { delay, .. } | ReconnectDecision::WipeCredentials { delay, .. } => {
                *delay
            }
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.max_retries,
            base_delay: cfg.retry_base_delay,
            max_delay: cfg.retry_max_delay,
            wipe_codes: cfg.wipe_reason_codes.clone(),
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide after an established connection closed.
    pub fn decide(&self, state: &mut RetryState, reason: &DisconnectReason) -> ReconnectDecision {
        match reason.status_code {
            Some(code) if self.wipe_codes.contains(&code) => self.wipe(state, false),
            Some(code) if code == self.logged_out_code => self.wipe(state, true),
            _ => self.backoff(state),
        }
    }

    /// Decide after a connection attempt failed outright. A transport that
    /// refused with a reason code is judged like a close with that code.
    pub fn decide_connect_error(&self, state: &mut RetryState, err: &Error) -> ReconnectDecision {
        match err {
            Error::SessionAuthInvalid(_) => self.wipe(state, false),
            Error::SessionTransportDropped(reason) => self.decide(state, reason),
            _ => self.backoff(state),
        }
    }

    fn backoff(&self, state: &mut RetryState) -> ReconnectDecision {
        state.attempt += 1;
        if state.attempt <= self.max_attempts {
            ReconnectDecision::Retry {
                attempt: state.attempt,
                delay: self.backoff_delay(state.attempt),
            }
        } else {
            // Out of attempts: start over once more from clean credentials.
            self.wipe(state, false)
        }
    }

    fn wipe(&self, state: &mut RetryState, logged_out: bool) -> ReconnectDecision {
        state.reset();
        ReconnectDecision::WipeCredentials {
            delay: self.wipe_restart_delay,
            logged_out,
        }
    }
}
