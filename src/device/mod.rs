//! Stable per-installation identifier used to attribute remote writes.
//!
//! Not security-sensitive: the id only shows up in diagnostics, so
//! collisions are tolerable.

use std::sync::OnceLock;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, warn};

use crate::storage::LocalStore;

/// Storage key holding the device identifier.
pub const DEVICE_ID_STORAGE_KEY: &str = "device_id";

const SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Lazily generated, persisted device identifier.
#[derive(Debug)]
pub struct DeviceIdentity {
    store: LocalStore,
    cached: OnceLock<String>,
}

impl DeviceIdentity {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            cached: OnceLock::new(),
        }
    }

    /// The device id, generated and persisted on first call.
    ///
    /// If storage is unavailable the generated id is still stable for the
    /// lifetime of this instance.
    pub fn device_id(&self) -> &str {
        self.cached.get_or_init(|| {
            if let Some(existing) = self.store.get(DEVICE_ID_STORAGE_KEY) {
                return existing;
            }

            let generated = generate_device_id();
            if self.store.set(DEVICE_ID_STORAGE_KEY, &generated) {
                debug!(device_id = %generated, "Generated new device id");
            } else {
                warn!(device_id = %generated, "Device id could not be persisted; it will change on restart");
            }
            generated
        })
    }
}

/// `device_<epoch millis>_<9 random base36 chars>`
pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("device_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_format() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "device");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_id_is_persisted_and_reused() {
        let store = LocalStore::in_memory();

        let first = DeviceIdentity::new(store.clone()).device_id().to_string();
        let second = DeviceIdentity::new(store.clone()).device_id().to_string();

        assert_eq!(first, second);
        assert_eq!(store.get(DEVICE_ID_STORAGE_KEY), Some(first));
    }

    #[test]
    fn test_existing_id_is_respected() {
        let store = LocalStore::in_memory();
        store.set(DEVICE_ID_STORAGE_KEY, "device_1_legacyabc");

        let identity = DeviceIdentity::new(store);
        assert_eq!(identity.device_id(), "device_1_legacyabc");
    }

    #[test]
    fn test_stable_without_storage() {
        let identity = DeviceIdentity::new(LocalStore::unavailable());
        let first = identity.device_id().to_string();
        assert_eq!(identity.device_id(), first);
    }
}
