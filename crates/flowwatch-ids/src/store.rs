//! Bounded per-key baseline state shared by the keyed detectors.
//!
//! Entries are created lazily on first sighting and remember the last
//! window that touched them. At window close, [`BaselineStore::maintain`]
//! ages out idle entries and evicts the stalest ones once the store
//! grows past its capacity, so long runs stay within a memory bound.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IdsError, IdsResult};

/// Default maximum number of keys kept per detector.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 65_536;

/// Bounds for a [`BaselineStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keys retained after each window close.
    pub max_tracked_keys: usize,
    /// Drop keys not touched for this many windows. `None` keeps them.
    pub max_idle_windows: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            max_idle_windows: None,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self, section: &str) -> IdsResult<()> {
        if self.max_tracked_keys == 0 {
            return Err(IdsError::invalid(
                &format!("{}.max_tracked_keys", section),
                "must be at least 1",
            ));
        }
        if self.max_idle_windows == Some(0) {
            return Err(IdsError::invalid(
                &format!("{}.max_idle_windows", section),
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Slot<V> {
    value: V,
    last_window: u64,
}

/// Keyed baseline values with staleness tracking.
#[derive(Clone, Debug)]
pub struct BaselineStore<K, V> {
    entries: HashMap<K, Slot<V>>,
    config: StoreConfig,
    evicted: u64,
}

impl<K: Eq + Hash + Clone, V> BaselineStore<K, V> {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            evicted: 0,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|s| &s.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|s| &mut s.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// The value for `key`, created with `init` if absent, and whether it
    /// was just created. Marks the entry as touched in `window`.
    pub fn entry_or_insert_with(
        &mut self,
        key: K,
        window: u64,
        init: impl FnOnce() -> V,
    ) -> (&mut V, bool) {
        let is_new = !self.entries.contains_key(&key);
        let slot = self.entries.entry(key).or_insert_with(|| Slot {
            value: init(),
            last_window: window,
        });
        slot.last_window = window;
        (&mut slot.value, is_new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, s)| (k, &s.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut().map(|(k, s)| (k, &mut s.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total entries dropped by aging or capacity.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Enforce the idle limit and the capacity as of `window`.
    /// Returns the number of entries dropped.
    pub fn maintain(&mut self, window: u64) -> usize {
        let before = self.entries.len();

        if let Some(max_idle) = self.config.max_idle_windows {
            self.entries
                .retain(|_, slot| window.saturating_sub(slot.last_window) < max_idle);
        }

        let cap = self.config.max_tracked_keys;
        if self.entries.len() > cap {
            let mut ages: Vec<(u64, K)> = self
                .entries
                .iter()
                .map(|(k, s)| (s.last_window, k.clone()))
                .collect();
            ages.sort_by_key(|(last, _)| *last);
            let excess = ages.len() - cap;
            for (_, key) in ages.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.evicted += dropped as u64;
            debug!(window, dropped, kept = self.entries.len(), "baseline entries evicted");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(cap: usize, idle: Option<u64>) -> BaselineStore<&'static str, u32> {
        BaselineStore::new(StoreConfig {
            max_tracked_keys: cap,
            max_idle_windows: idle,
        })
    }

    #[test]
    fn lazily_creates_and_reports_new_keys() {
        let mut s = store(8, None);
        let (v, new) = s.entry_or_insert_with("a", 0, || 0);
        *v += 5;
        assert!(new);
        let (v, new) = s.entry_or_insert_with("a", 1, || 0);
        assert!(!new);
        assert_eq!(*v, 5);
        assert_eq!(s.get(&"a"), Some(&5));
        assert_eq!(s.get(&"b"), None);
    }

    #[test]
    fn capacity_evicts_stalest() {
        let mut s = store(2, None);
        s.entry_or_insert_with("old", 0, || 1);
        s.entry_or_insert_with("mid", 1, || 2);
        s.entry_or_insert_with("new", 2, || 3);
        assert_eq!(s.maintain(2), 1);
        assert!(!s.contains(&"old"));
        assert!(s.contains(&"mid"));
        assert!(s.contains(&"new"));
        assert_eq!(s.evicted(), 1);
    }

    #[test]
    fn idle_entries_age_out() {
        let mut s = store(8, Some(3));
        s.entry_or_insert_with("quiet", 0, || 1);
        s.entry_or_insert_with("busy", 0, || 1);
        s.entry_or_insert_with("busy", 3, || 1);
        assert_eq!(s.maintain(3), 1);
        assert!(s.contains(&"busy"));
        assert!(!s.contains(&"quiet"));
    }

    #[test]
    fn config_validation() {
        assert!(StoreConfig::default().validate("pattern").is_ok());
        let bad = StoreConfig {
            max_tracked_keys: 0,
            max_idle_windows: None,
        };
        assert!(bad.validate("pattern").unwrap_err().to_string().contains("pattern.max_tracked_keys"));
    }
}
