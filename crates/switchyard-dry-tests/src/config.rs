// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use switchyard_core::config::{ConfigError, ConfigStore};

/// [`ConfigStore`] backed by a map, with call counters and failure switches.
///
/// Clones share the same map, so a test can hand one clone to a
/// `ConfigService` and inspect the other.
///
/// # Example
///
/// ```
/// use switchyard_core::{BusConfig, ConfigService};
/// use switchyard_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let service = ConfigService::new(store.clone());
/// service.save("bus", &BusConfig::default()).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key("bus"));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Rc<RefCell<StoreState>>,
}

#[derive(Default)]
struct StoreState {
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

    /// Store holding `json` under `key`.
    pub fn with_json(key: &str, json: &str) -> Self {
        let store = Self::new();
        store
            .inner
            .borrow_mut()
            .data
            .insert(key.to_owned(), json.as_bytes().to_vec());
        store
    }

    /// Makes every subsequent load fail with `ConfigError::Other`.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.inner.borrow_mut().fail_loads = fail;
    }

    /// Makes every subsequent save fail with `ConfigError::Other`.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.inner.borrow_mut().fail_saves = fail;
    }

    /// Load attempts, including failed ones.
    pub fn load_count(&self) -> usize {
        self.inner.borrow().loads
    }

    /// Save attempts, including failed ones.
    pub fn save_count(&self) -> usize {
        self.inner.borrow().saves
    }

    /// True when `key` holds a blob.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().data.contains_key(key)
    }

    /// Stored blob for `key` as UTF-8, if any.
    pub fn text(&self, key: &str) -> Option<String> {
        self.inner
            .borrow()
            .data
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut state = self.inner.borrow_mut();
        state.loads += 1;
        if state.fail_loads {
            return Err(ConfigError::Other("simulated load failure".into()));
        }
        state.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut state = self.inner.borrow_mut();
        state.saves += 1;
        if state.fail_saves {
            return Err(ConfigError::Other("simulated save failure".into()));
        }
        state.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}
