//! In-process document store with merge-on-write, used for offline demos and
//! to drive the orchestrator in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::RemoteStore;
use crate::codec::{decode_document, encode_document, merge_on_write, wire_time, LAST_MODIFIED_KEY};
use crate::error::{SyncError, SyncResult};
use crate::record::UserRecord;

/// Remote operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Ping,
    Exists,
    Download,
    Upload,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Map<String, Value>>,
    offline: bool,
    latency: HashMap<RemoteOp, Duration>,
    failures: HashMap<RemoteOp, VecDeque<SyncError>>,
    calls: Vec<RemoteOp>,
}

/// Document store keyed by user id.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate losing or regaining the network.
    pub fn set_online(&self, online: bool) {
        self.lock().offline = !online;
    }

    /// Delay every future call of `op`.
    pub fn set_latency(&self, op: RemoteOp, latency: Duration) {
        self.lock().latency.insert(op, latency);
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: SyncError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Store a record as if another device had uploaded it.
    pub fn seed(&self, user_id: &str, record: &UserRecord, device_id: &str) -> SyncResult<()> {
        let doc = encode_document(record, device_id)?;
        let mut map = doc.as_object().cloned().unwrap_or_default();
        map.insert(
            LAST_MODIFIED_KEY.to_string(),
            Value::String(wire_time::encode(&Utc::now())),
        );
        self.lock().documents.insert(user_id.to_string(), map);
        Ok(())
    }

    /// The raw stored document.
    pub fn document(&self, user_id: &str) -> Option<Value> {
        self.lock()
            .documents
            .get(user_id)
            .cloned()
            .map(Value::Object)
    }

    /// The stored document decoded as a record.
    pub fn record(&self, user_id: &str) -> Option<UserRecord> {
        self.document(user_id).and_then(|doc| decode_document(doc).ok())
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteOp> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    /// Log the call and return its latency, or the error it must fail with.
    fn begin(&self, op: RemoteOp) -> SyncResult<Duration> {
        let mut inner = self.lock();
        inner.calls.push(op);
        if let Some(error) = inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        if inner.offline {
            return Err(SyncError::Connectivity("network unreachable".to_string()));
        }
        Ok(inner.latency.get(&op).copied().unwrap_or_default())
    }

    async fn enter(&self, op: RemoteOp) -> SyncResult<()> {
        let latency = self.begin(op)?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn ping(&self) -> SyncResult<()> {
        self.enter(RemoteOp::Ping).await
    }

    async fn exists(&self, user_id: &str) -> SyncResult<bool> {
        self.enter(RemoteOp::Exists).await?;
        Ok(self.lock().documents.contains_key(user_id))
    }

    async fn download(&self, user_id: &str) -> SyncResult<Option<UserRecord>> {
        self.enter(RemoteOp::Download).await?;
        self.document(user_id).map(decode_document).transpose()
    }

    async fn upload(
        &self,
        user_id: &str,
        record: &UserRecord,
        device_id: &str,
    ) -> SyncResult<Option<DateTime<Utc>>> {
        self.enter(RemoteOp::Upload).await?;

        let doc = encode_document(record, device_id)?;
        let incoming = doc.as_object().cloned().unwrap_or_default();
        let written_at = Utc::now();

        let mut inner = self.lock();
        let stored = inner.documents.entry(user_id.to_string()).or_default();
        merge_on_write(stored, incoming);
        stored.insert(
            LAST_MODIFIED_KEY.to_string(),
            Value::String(wire_time::encode(&written_at)),
        );
        Ok(Some(written_at))
    }
}
