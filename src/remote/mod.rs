//! Remote replica of the user record.
//!
//! The engine needs exactly four operations. Implementations do not enforce
//! time budgets themselves; the orchestrator bounds every call and drops the
//! future on timeout or cancellation, which aborts the underlying request.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::record::UserRecord;

pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::{InMemoryRemoteStore, RemoteOp};

/// Document store holding one record per user id.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Liveness probe. Any error means "offline".
    async fn ping(&self) -> SyncResult<()>;

    /// Whether a cloud copy exists for the user.
    async fn exists(&self, user_id: &str) -> SyncResult<bool>;

    /// The cloud copy, or `None` when the user has never uploaded.
    async fn download(&self, user_id: &str) -> SyncResult<Option<UserRecord>>;

    /// Write the record with merge-on-write semantics: fields absent from
    /// the payload are kept. Returns the server-assigned write marker when
    /// the store reports one.
    async fn upload(
        &self,
        user_id: &str,
        record: &UserRecord,
        device_id: &str,
    ) -> SyncResult<Option<DateTime<Utc>>>;
}
