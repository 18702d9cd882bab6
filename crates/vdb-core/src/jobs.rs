//! Admission control for download jobs.
//!
//! Jobs from one chat run one at a time (in arrival order); across chats at
//! most `max_concurrent` jobs run at once.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex as StdMutex, MutexGuard,
    },
};

use tokio::sync::{Mutex, Semaphore};

use crate::{config::Config, domain::ChatId};

#[derive(Default)]
struct ChatSlot {
    lock: Mutex<()>,
    pending: AtomicUsize,
}

type ChatSlots = Arc<StdMutex<HashMap<ChatId, Arc<ChatSlot>>>>;

fn lock_slots(slots: &ChatSlots) -> MutexGuard<'_, HashMap<ChatId, Arc<ChatSlot>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct JobGate {
    global: Arc<Semaphore>,
    /// Only chats with queued or running jobs have an entry.
    chats: ChatSlots,
    max_queued_per_chat: usize,
}

/// Result of asking the gate for a slot.
pub enum Admission {
    Admitted(JobTicket),
    /// The chat already has `queued` jobs waiting or running.
    QueueFull { queued: usize },
}

impl JobGate {
    pub fn new(max_concurrent: usize, max_queued_per_chat: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent.max(1))),
            chats: Arc::new(StdMutex::new(HashMap::new())),
            max_queued_per_chat: max_queued_per_chat.max(1),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.max_concurrent_jobs, cfg.max_queued_per_chat)
    }

    /// Reserve a place in the chat's queue without waiting.
    pub async fn admit(&self, chat_id: ChatId) -> Admission {
        let mut map = lock_slots(&self.chats);
        let slot = map.entry(chat_id).or_default().clone();

        let reserved = slot
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_queued_per_chat).then_some(n + 1)
            });

        match reserved {
            Ok(_) => Admission::Admitted(JobTicket {
                chat_id,
                slot,
                chats: self.chats.clone(),
                global: self.global.clone(),
            }),
            Err(queued) => Admission::QueueFull { queued },
        }
    }

    /// Jobs currently queued or running for `chat_id`.
    pub fn pending(&self, chat_id: ChatId) -> usize {
        lock_slots(&self.chats)
            .get(&chat_id)
            .map(|s| s.pending.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Chats that currently hold a queue entry.
    pub fn tracked_chats(&self) -> usize {
        lock_slots(&self.chats).len()
    }
}

/// A reserved queue place. Dropping it (run finished or never started)
/// releases the place.
pub struct JobTicket {
    chat_id: ChatId,
    slot: Arc<ChatSlot>,
    chats: ChatSlots,
    global: Arc<Semaphore>,
}

impl JobTicket {
    /// Wait for the chat's turn and a global worker permit, then run `job`.
    pub async fn run<F: Future>(self, job: F) -> F::Output {
        let _chat = self.slot.lock.lock().await;
        // The semaphore is never closed, so a failed acquire only means "no limit".
        let _permit = self.global.clone().acquire_owned().await.ok();
        job.await
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        // Reservations happen under the map lock, so checking here cannot race
        // with a new ticket for the same chat.
        let mut map = lock_slots(&self.chats);
        let left = self.slot.pending.fetch_sub(1, Ordering::AcqRel) - 1;
        // The map and this ticket are the only owners once the chat is idle.
        if left == 0 && Arc::strong_count(&self.slot) == 2 {
            map.remove(&self.chat_id);
        }
    }
}
