//! Progress Sync Core Library
//!
//! Offline-first synchronization of one user's progress record between a
//! local replica and a remote document store:
//! - **record**: the typed user record, with additive and mutable collections
//! - **codec**: the wire format, including every date conversion
//! - **storage** / **device**: fail-safe local key-value storage and the
//!   per-installation device id
//! - **remote**: the remote store contract, with HTTP and in-memory adapters
//! - **conflict**: divergence detection between two replicas
//! - **merge**: take-local, take-remote and field-wise merge
//! - **sync**: the orchestrator state machine tying it all together
//!
//! Detection and resolution are pure and also exposed as JSON in/JSON out
//! functions for hosts that embed the core over FFI or WASM.
//!
//! # Example (conceptual)
//! ```ignore
//! let remote = Arc::new(HttpRemoteStore::new(&HttpRemoteConfig {
//!     base_url: "https://example.com/api".into(),
//!     user_agent: None,
//! })?);
//! let sync = SyncOrchestrator::new(remote, LocalStore::in_memory(), SyncConfig::default());
//!
//! match sync.sync_user_data(&user_id, record, &CancellationToken::new()).await {
//!     SyncOutcome::Conflict(conflict) => ask_user(conflict),
//!     outcome => keep(outcome.into_record()),
//! }
//! ```

pub mod codec;
pub mod config;
pub mod conflict;
pub mod device;
pub mod error;
pub mod merge;
pub mod record;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::{DivergencePolicy, SyncConfig, Timeouts};
pub use conflict::{
    detect_conflicts, detect_conflicts_json, ConflictDetector, DetectInput, Detection, Divergence,
};
pub use device::DeviceIdentity;
pub use error::{StorageError, SyncError, SyncResult};
pub use merge::{
    merge_records, resolve, resolve_conflict, resolve_conflict_json, MergeOutput, MergeStats,
    ResolveInput, ResolveOutput, Strategy,
};
pub use record::UserRecord;
pub use remote::{HttpRemoteConfig, HttpRemoteStore, InMemoryRemoteStore, RemoteStore};
pub use storage::{FileBackend, KeyValueBackend, LocalStore, MemoryBackend};
pub use sync::{
    PendingConflict, SyncOrchestrator, SyncOutcome, SyncState, SyncStatus, SyncSubscription,
};

// WASM bindings
#[cfg(feature = "wasm")]
pub mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::*;

// C FFI exports for native hosts
#[cfg(feature = "ffi")]
pub mod ffi;
