// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use offer_app_core::config::{ConfigError, ConfigStore};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory [`ConfigStore`] that counts calls and can simulate failures.
///
/// Clones share storage, so a test can hand one clone to a
/// `ConfigService` and inspect the other.
///
/// # Example
///
/// ```
/// use offer_app_core::config::ConfigService;
/// use offer_app_core::prefs::{MatrixPrefs, PrefsPort};
/// use offer_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
/// service.save_prefs("Acme", &MatrixPrefs::default()).unwrap();
/// assert!(store.contains_key("offer-matrix.acme"));
/// assert_eq!(store.saves(), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Blobs>>,
}

#[derive(Default)]
struct Blobs {
    data: BTreeMap<String, Vec<u8>>,
    loads: usize,
    saves: usize,
    fail_loads: bool,
    fail_saves: bool,
}

impl InMemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Blobs) -> R) -> R {
        let mut blobs = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut blobs)
    }

    /// Store a raw blob directly, bypassing counters.
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.with(|b| {
            b.data.insert(key.to_string(), data.into());
        });
    }

    /// Raw blob under `key`, bypassing counters.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.with(|b| b.data.get(key).cloned())
    }

    /// Make every load fail.
    pub fn set_fail_loads(&self, fail: bool) {
        self.with(|b| b.fail_loads = fail);
    }

    /// Make every save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.with(|b| b.fail_saves = fail);
    }

    /// `load_raw` attempts, failed ones included.
    pub fn loads(&self) -> usize {
        self.with(|b| b.loads)
    }

    /// `save_raw` attempts, failed ones included.
    pub fn saves(&self) -> usize {
        self.with(|b| b.saves)
    }

    /// True if `key` holds a blob.
    pub fn contains_key(&self, key: &str) -> bool {
        self.with(|b| b.data.contains_key(key))
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.with(|b| b.data.keys().cloned().collect())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.with(|b| {
            b.loads += 1;
            if b.fail_loads {
                return Err(ConfigError::Other("simulated load failure".into()));
            }
            b.data.get(key).cloned().ok_or(ConfigError::NotFound)
        })
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.with(|b| {
            b.saves += 1;
            if b.fail_saves {
                return Err(ConfigError::Other("simulated save failure".into()));
            }
            b.data.insert(key.to_string(), data.to_vec());
            Ok(())
        })
    }
}
