//! Sync orchestration: connectivity probing, upload/download and the
//! reconciliation state machine.
//!
//! ```text
//!   offline ──sync──▶ syncing ──▶ synced
//!                        │  └────▶ offline   (probe failed)
//!                        └───────▶ error     (remote failure, conflict, cancel)
//! ```
//!
//! Every remote call is bounded by its time budget and by the caller's
//! cancellation token. Only one sync per user runs at a time; later calls
//! queue behind it. No path discards the caller's record: every outcome
//! carries the record the host should keep using.

mod state;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, Timeouts};
use crate::conflict::{ConflictDetector, Divergence};
use crate::device::DeviceIdentity;
use crate::error::{SyncError, SyncResult};
use crate::merge::{merge_records, resolve, Strategy};
use crate::record::UserRecord;
use crate::remote::RemoteStore;
use crate::storage::{pending_sync_key, LocalStore, PENDING_FLAG_VALUE};

pub use state::{SyncState, SyncStatus, SyncSubscription};
use state::StateChannel;

/// Both replicas of a sync that halted on divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConflict {
    pub local: UserRecord,
    pub remote: UserRecord,
    pub divergences: Vec<Divergence>,
    pub detected_at: DateTime<Utc>,
}

/// How a sync attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Both replicas now hold this record
    Synced(UserRecord),
    /// Connectivity probe failed; the record is unchanged and pending
    Offline(UserRecord),
    /// Replicas diverged; nothing was uploaded
    Conflict(Box<PendingConflict>),
    /// A remote operation failed; the record is unchanged and pending
    Failed { record: UserRecord, error: SyncError },
    /// The caller cancelled; the record is unchanged and pending
    Cancelled(UserRecord),
}

impl SyncOutcome {
    /// The record the host should keep using.
    pub fn record(&self) -> &UserRecord {
        match self {
            SyncOutcome::Synced(record)
            | SyncOutcome::Offline(record)
            | SyncOutcome::Cancelled(record)
            | SyncOutcome::Failed { record, .. } => record,
            SyncOutcome::Conflict(conflict) => &conflict.local,
        }
    }

    pub fn into_record(self) -> UserRecord {
        match self {
            SyncOutcome::Synced(record)
            | SyncOutcome::Offline(record)
            | SyncOutcome::Cancelled(record)
            | SyncOutcome::Failed { record, .. } => record,
            SyncOutcome::Conflict(conflict) => conflict.local,
        }
    }

    /// The state this outcome leaves the orchestrator in.
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncOutcome::Synced(_) => SyncStatus::Synced,
            SyncOutcome::Offline(_) => SyncStatus::Offline,
            SyncOutcome::Conflict(_) | SyncOutcome::Failed { .. } | SyncOutcome::Cancelled(_) => {
                SyncStatus::Error
            }
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced(_))
    }
}

/// Successful end of a sync body, before bookkeeping.
enum Reconciled {
    Uploaded(UserRecord),
    Diverged(PendingConflict),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `fut` under a time budget, giving up early if `cancel` fires.
///
/// Losing the race drops `fut`, which aborts the underlying request.
async fn bounded<T, F>(
    operation: &'static str,
    budget: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = tokio::time::timeout(budget, fut) => match result {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout { operation, after: budget }),
        },
    }
}

type UserLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive right to sync one user.
///
/// Dropping it forgets the user's lock once no other call holds or awaits it.
struct UserLease<'a> {
    locks: &'a UserLocks,
    user_id: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLease<'_> {
    fn drop(&mut self) {
        let mut locks = lock(self.locks);
        drop(self.guard.take());
        if locks
            .get(self.user_id)
            .is_some_and(|user_lock| Arc::strong_count(user_lock) == 1)
        {
            locks.remove(self.user_id);
        }
    }
}

/// Drives reconciliation between the local record and the remote replica.
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStore>,
    store: LocalStore,
    device: DeviceIdentity,
    detector: ConflictDetector,
    timeouts: Timeouts,
    state: StateChannel,
    user_locks: UserLocks,
    /// Per-user count of pending marks. An upload only clears the flag if
    /// no mark landed after the sync read this count.
    pending_marks: Mutex<HashMap<String, u64>>,
    conflicts: Mutex<HashMap<String, PendingConflict>>,
}

impl SyncOrchestrator {
    pub fn new(remote: Arc<dyn RemoteStore>, store: LocalStore, config: SyncConfig) -> Self {
        Self {
            remote,
            device: DeviceIdentity::new(store.clone()),
            store,
            detector: ConflictDetector::new(config.policy),
            timeouts: config.timeouts,
            state: StateChannel::new(),
            user_locks: Mutex::new(HashMap::new()),
            pending_marks: Mutex::new(HashMap::new()),
            conflicts: Mutex::new(HashMap::new()),
        }
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    pub fn current_state(&self) -> SyncState {
        self.state.current()
    }

    /// Observe state transitions, starting with the current state.
    pub fn subscribe(&self) -> SyncSubscription {
        self.state.subscribe()
    }

    /// Whether local changes have not been confirmed uploaded.
    pub fn has_pending_changes(&self, user_id: &str) -> bool {
        self.store.get(&pending_sync_key(user_id)).as_deref() == Some(PENDING_FLAG_VALUE)
    }

    /// Both replicas of the last halted sync for this user, if unresolved.
    pub fn pending_conflict(&self, user_id: &str) -> Option<PendingConflict> {
        lock(&self.conflicts).get(user_id).cloned()
    }

    /// Host signal that the network went away.
    pub fn connectivity_lost(&self) {
        debug!("Connectivity lost");
        self.state.update(|s| {
            s.status = SyncStatus::Offline;
            s.error = None;
        });
    }

    /// Probe the remote store. Never changes state.
    pub async fn is_online(&self, cancel: &CancellationToken) -> bool {
        match self.probe(cancel).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    /// Full reconciliation: probe, fetch, detect, then merge and upload or
    /// halt on divergence.
    pub async fn sync_user_data(
        &self,
        user_id: &str,
        local: UserRecord,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        self.run_reconcile("auto", user_id, local, cancel).await
    }

    /// Same as [`sync_user_data`](Self::sync_user_data), triggered by the user.
    pub async fn force_sync(
        &self,
        user_id: &str,
        local: UserRecord,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        self.run_reconcile("manual", user_id, local, cancel).await
    }

    /// Push local changes without fetching the remote replica.
    ///
    /// Marks changes pending before queueing; the flag is only cleared by a
    /// confirmed upload that covers this mark. While a conflict is stored for
    /// the user nothing is uploaded, since that would overwrite the replica
    /// awaiting a decision.
    pub async fn background_sync(
        &self,
        user_id: &str,
        local: UserRecord,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        let covered = self.mark_pending(user_id);
        let Some(_lease) = self.acquire(user_id, cancel).await else {
            debug!(user_id, "Background sync cancelled while queued");
            return SyncOutcome::Cancelled(local);
        };

        if let Some(conflict) = self.pending_conflict(user_id) {
            debug!(user_id, "Background sync held back by unresolved conflict");
            return self.conclude(user_id, covered, local, Ok(Reconciled::Diverged(conflict)));
        }

        self.begin(user_id, "background");
        let result = self.push(user_id, &local, cancel).await;
        self.conclude(user_id, covered, local, result)
    }

    /// Resolve the stored conflict with `strategy` and upload the result.
    ///
    /// The conflict is consumed as soon as the resolution is computed; if the
    /// upload then fails the resolved record stays pending like any other
    /// local change.
    pub async fn apply_resolution(
        &self,
        user_id: &str,
        strategy: Strategy,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncOutcome> {
        let Some(_lease) = self.acquire(user_id, cancel).await else {
            return Err(SyncError::Cancelled);
        };

        let conflict = lock(&self.conflicts)
            .remove(user_id)
            .ok_or_else(|| SyncError::NoPendingConflict(user_id.to_string()))?;
        let resolved = resolve(&conflict.local, &conflict.remote, strategy);
        info!(user_id, ?strategy, "Applying conflict resolution");

        let covered = self.mark_pending(user_id);
        self.begin(user_id, "resolution");
        let result = self.push(user_id, &resolved, cancel).await;
        Ok(self.conclude(user_id, covered, resolved, result))
    }

    async fn run_reconcile(
        &self,
        trigger: &'static str,
        user_id: &str,
        local: UserRecord,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        let covered = self.pending_mark(user_id);
        let Some(_lease) = self.acquire(user_id, cancel).await else {
            return self.cancelled_while_queued(user_id, local);
        };

        self.begin(user_id, trigger);
        let result = self.reconcile(user_id, &local, cancel).await;
        self.conclude(user_id, covered, local, result)
    }

    async fn reconcile(
        &self,
        user_id: &str,
        local: &UserRecord,
        cancel: &CancellationToken,
    ) -> SyncResult<Reconciled> {
        self.probe(cancel).await?;

        let exists = bounded(
            "exists",
            self.timeouts.exists(),
            cancel,
            self.remote.exists(user_id),
        )
        .await?;
        if !exists {
            debug!(user_id, "No cloud copy; uploading local record");
            return self.upload(user_id, local, cancel).await;
        }

        let downloaded = bounded(
            "download",
            self.timeouts.read(),
            cancel,
            self.remote.download(user_id),
        )
        .await?;
        let Some(remote) = downloaded else {
            debug!(user_id, "Cloud copy vanished; uploading local record");
            return self.upload(user_id, local, cancel).await;
        };

        let detection = self.detector.detect(local, &remote);
        if !detection.auto_mergeable {
            return Ok(Reconciled::Diverged(PendingConflict {
                local: local.clone(),
                remote,
                divergences: detection.divergences,
                detected_at: Utc::now(),
            }));
        }

        let merged = match detection.merged {
            Some(merged) => merged,
            None => merge_records(local, &remote).record,
        };
        self.upload(user_id, &merged, cancel).await
    }

    /// Probe, then upload.
    async fn push(
        &self,
        user_id: &str,
        record: &UserRecord,
        cancel: &CancellationToken,
    ) -> SyncResult<Reconciled> {
        self.probe(cancel).await?;
        self.upload(user_id, record, cancel).await
    }

    async fn upload(
        &self,
        user_id: &str,
        record: &UserRecord,
        cancel: &CancellationToken,
    ) -> SyncResult<Reconciled> {
        let written_at = bounded(
            "upload",
            self.timeouts.write(),
            cancel,
            self.remote.upload(user_id, record, self.device.device_id()),
        )
        .await?;
        debug!(user_id, ?written_at, "Uploaded record");
        Ok(Reconciled::Uploaded(record.clone()))
    }

    /// Ping under its budget. Every failure except cancellation is a
    /// connectivity failure.
    async fn probe(&self, cancel: &CancellationToken) -> SyncResult<()> {
        match bounded("ping", self.timeouts.ping(), cancel, self.remote.ping()).await {
            Ok(()) => Ok(()),
            Err(e @ (SyncError::Cancelled | SyncError::Connectivity(_))) => Err(e),
            Err(e) => Err(SyncError::Connectivity(e.to_string())),
        }
    }

    /// Wait for this user's lock. `None` if cancelled while queued.
    async fn acquire<'a>(
        &'a self,
        user_id: &'a str,
        cancel: &CancellationToken,
    ) -> Option<UserLease<'a>> {
        let user_lock = lock(&self.user_locks)
            .entry(user_id.to_string())
            .or_default()
            .clone();

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = user_lock.lock_owned() => Some(guard),
        };
        let lease = UserLease {
            locks: &self.user_locks,
            user_id,
            guard,
        };
        lease.guard.is_some().then_some(lease)
    }

    fn begin(&self, user_id: &str, trigger: &'static str) {
        debug!(user_id, trigger, "Sync started");
        self.state.update(|s| {
            s.status = SyncStatus::Syncing;
            s.error = None;
        });
    }

    fn set_pending(&self, user_id: &str, pending: bool) {
        let key = pending_sync_key(user_id);
        let persisted = if pending {
            self.store.set(&key, PENDING_FLAG_VALUE)
        } else {
            self.store.remove(&key)
        };
        if !persisted {
            warn!(user_id, pending, "Pending-changes flag not persisted");
        }
    }

    /// Record unsynced local changes and return the new mark.
    fn mark_pending(&self, user_id: &str) -> u64 {
        let mut marks = lock(&self.pending_marks);
        let mark = marks.entry(user_id.to_string()).or_insert(0);
        *mark += 1;
        self.set_pending(user_id, true);
        *mark
    }

    fn pending_mark(&self, user_id: &str) -> u64 {
        lock(&self.pending_marks).get(user_id).copied().unwrap_or(0)
    }

    /// Clear the flag unless changes were marked after `covered` was read.
    fn clear_pending(&self, user_id: &str, covered: u64) -> bool {
        let marks = lock(&self.pending_marks);
        if marks.get(user_id).copied().unwrap_or(0) != covered {
            debug!(user_id, "Changes marked during sync; keeping pending flag");
            return false;
        }
        self.set_pending(user_id, false);
        true
    }

    /// Cancelled before the sync body ran. Only the flag is touched, and
    /// only towards "pending".
    fn cancelled_while_queued(&self, user_id: &str, local: UserRecord) -> SyncOutcome {
        debug!(user_id, "Sync cancelled while queued");
        self.mark_pending(user_id);
        SyncOutcome::Cancelled(local)
    }

    /// Persist the outcome of a sync body and publish the new state.
    ///
    /// `covered` is the pending mark the sync started from.
    fn conclude(
        &self,
        user_id: &str,
        covered: u64,
        fallback: UserRecord,
        result: SyncResult<Reconciled>,
    ) -> SyncOutcome {
        match result {
            Ok(Reconciled::Uploaded(record)) => {
                let cleared = self.clear_pending(user_id, covered);
                lock(&self.conflicts).remove(user_id);
                let now = Utc::now();
                self.state.update(|s| {
                    s.status = SyncStatus::Synced;
                    s.last_sync = Some(now);
                    s.pending_changes = !cleared;
                    s.error = None;
                });
                info!(user_id, "Sync completed");
                SyncOutcome::Synced(record)
            }
            Ok(Reconciled::Diverged(conflict)) => {
                self.set_pending(user_id, true);
                info!(
                    user_id,
                    divergences = conflict.divergences.len(),
                    "Conflicts require manual resolution"
                );
                lock(&self.conflicts).insert(user_id.to_string(), conflict.clone());
                self.fail_state(SyncError::ConflictRequiresResolution.to_string());
                SyncOutcome::Conflict(Box::new(conflict))
            }
            Err(SyncError::Connectivity(reason)) => {
                self.set_pending(user_id, true);
                debug!(user_id, %reason, "Offline; keeping local record");
                self.state.update(|s| {
                    s.status = SyncStatus::Offline;
                    s.pending_changes = true;
                    s.error = None;
                });
                SyncOutcome::Offline(fallback)
            }
            Err(SyncError::Cancelled) => {
                self.set_pending(user_id, true);
                debug!(user_id, "Sync cancelled");
                self.fail_state(SyncError::Cancelled.to_string());
                SyncOutcome::Cancelled(fallback)
            }
            Err(error) => {
                self.set_pending(user_id, true);
                warn!(user_id, %error, "Sync failed");
                self.fail_state(error.to_string());
                SyncOutcome::Failed {
                    record: fallback,
                    error,
                }
            }
        }
    }

    fn fail_state(&self, message: String) {
        self.state.update(|s| {
            s.status = SyncStatus::Error;
            s.pending_changes = true;
            s.error = Some(message);
        });
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("device", &self.device)
            .field("timeouts", &self.timeouts)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}
