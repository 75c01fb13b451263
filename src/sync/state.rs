//! Observable sync state.
//!
//! Subscribers get the current state first, then every transition in the
//! order it happened. Senders live under the same lock as the state, so a
//! subscriber can never see a transition before the snapshot it replays.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

/// Snapshot delivered to observers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_changes: bool,
    pub error: Option<String>,
}

struct Shared {
    state: SyncState,
    next_id: u64,
    subscribers: Vec<(u64, UnboundedSender<SyncState>)>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current state plus its subscriber list.
pub(crate) struct StateChannel {
    shared: Arc<Mutex<Shared>>,
}

impl StateChannel {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: SyncState::default(),
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub(crate) fn current(&self) -> SyncState {
        lock(&self.shared).state.clone()
    }

    /// Apply `change` and broadcast the result.
    pub(crate) fn update<F>(&self, change: F) -> SyncState
    where
        F: FnOnce(&mut SyncState),
    {
        let mut shared = lock(&self.shared);
        change(&mut shared.state);
        let snapshot = shared.state.clone();
        shared
            .subscribers
            .retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
        snapshot
    }

    pub(crate) fn subscribe(&self) -> SyncSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut shared = lock(&self.shared);
        let id = shared.next_id;
        shared.next_id += 1;
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(shared.state.clone());
        shared.subscribers.push((id, tx));

        SyncSubscription {
            id,
            rx,
            channel: Arc::downgrade(&self.shared),
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.shared).subscribers.len()
    }
}

/// Receiving end of a state subscription. Dropping it unsubscribes.
pub struct SyncSubscription {
    id: u64,
    rx: UnboundedReceiver<SyncState>,
    channel: Weak<Mutex<Shared>>,
}

impl SyncSubscription {
    /// Wait for the next state. `None` once the orchestrator is gone.
    pub async fn recv(&mut self) -> Option<SyncState> {
        self.rx.recv().await
    }

    /// Next already-delivered state, if any.
    pub fn try_recv(&mut self) -> Option<SyncState> {
        match self.rx.try_recv() {
            Ok(state) => Some(state),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every state delivered so far.
    pub fn drain(&mut self) -> Vec<SyncState> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.channel.upgrade() {
            lock(&shared).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
