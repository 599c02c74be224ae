//! Reference handle cache.
//!
//! Maps graph keys (addresses, ranges) to their derived [`RefHandle`]s, with
//! a reverse index for handle-to-key lookup. Handle derivation can be
//! expensive on the host side, so each key's handle is derived at most once.

use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::handle::RefHandle;

/// Bidirectional key <-> handle cache.
///
/// The forward map is authoritative. Distinct keys can legitimately derive
/// equal handles (two ranges into the same closed workbook both produce the
/// same `NonLocal` value), so the reverse map records *a* key whose forward
/// entry is that handle and is only cleared when that exact pairing is
/// removed.
#[derive(Clone, Debug, Default)]
pub struct RefCache<K: Clone + Eq + Hash> {
    forward: FxHashMap<K, RefHandle>,
    reverse: FxHashMap<RefHandle, K>,
}

impl<K: Clone + Eq + Hash> RefCache<K> {
    pub fn new() -> Self {
        Self {
            forward: FxHashMap::default(),
            reverse: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    /// Handle previously derived for `key`, if any.
    pub fn get(&self, key: &K) -> Option<&RefHandle> {
        self.forward.get(key)
    }

    /// Reverse lookup: a key whose cached handle equals `handle`.
    pub fn key_for(&self, handle: &RefHandle) -> Option<&K> {
        self.reverse.get(handle)
    }

    /// Return the cached handle for `key`, deriving and inserting it via
    /// `derive` on first use.
    pub fn fetch_or_insert(&mut self, key: &K, derive: impl FnOnce() -> RefHandle) -> RefHandle {
        if let Some(h) = self.forward.get(key) {
            return h.clone();
        }
        let handle = derive();
        self.forward.insert(key.clone(), handle.clone());
        self.reverse.insert(handle.clone(), key.clone());
        handle
    }

    /// Replace the handle cached for `key` (inserting if absent).
    pub fn replace(&mut self, key: &K, handle: RefHandle) {
        if let Some(old) = self.forward.insert(key.clone(), handle.clone()) {
            if self.reverse.get(&old) == Some(key) {
                self.reverse.remove(&old);
            }
        }
        self.reverse.insert(handle, key.clone());
    }

    /// Drop the entry for `key`.
    pub fn remove(&mut self, key: &K) -> Option<RefHandle> {
        let old = self.forward.remove(key)?;
        if self.reverse.get(&old) == Some(key) {
            self.reverse.remove(&old);
        }
        Some(old)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.forward.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &RefHandle)> {
        self.forward.iter()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Locator;

    fn handle(row: u32) -> RefHandle {
        RefHandle::Local(Locator::cell("book.xlsx", "Sheet1", row, 1))
    }

    #[test]
    fn test_fetch_derives_once() {
        let mut cache: RefCache<String> = RefCache::new();
        let mut derivations = 0;

        let h1 = cache.fetch_or_insert(&"k".to_string(), || {
            derivations += 1;
            handle(1)
        });
        let h2 = cache.fetch_or_insert(&"k".to_string(), || {
            derivations += 1;
            handle(99)
        });

        assert_eq!(derivations, 1);
        assert_eq!(h1, h2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reverse_lookup() {
        let mut cache: RefCache<String> = RefCache::new();
        cache.fetch_or_insert(&"k".to_string(), || handle(1));
        assert_eq!(cache.key_for(&handle(1)), Some(&"k".to_string()));
        assert_eq!(cache.key_for(&handle(2)), None);
    }

    #[test]
    fn test_replace_clears_old_reverse_entry() {
        let mut cache: RefCache<String> = RefCache::new();
        cache.fetch_or_insert(&"k".to_string(), || handle(1));
        cache.replace(&"k".to_string(), handle(2));

        assert_eq!(cache.get(&"k".to_string()), Some(&handle(2)));
        assert_eq!(cache.key_for(&handle(1)), None);
        assert_eq!(cache.key_for(&handle(2)), Some(&"k".to_string()));
    }

    #[test]
    fn test_remove() {
        let mut cache: RefCache<String> = RefCache::new();
        cache.fetch_or_insert(&"k".to_string(), || handle(1));

        assert_eq!(cache.remove(&"k".to_string()), Some(handle(1)));
        assert!(cache.is_empty());
        assert_eq!(cache.key_for(&handle(1)), None);
        assert_eq!(cache.remove(&"k".to_string()), None);
    }

    #[test]
    fn test_shared_nonlocal_handles_keep_forward_entries() {
        let nl = RefHandle::NonLocal {
            dir: "dir".into(),
            workbook: "closed.xlsx".into(),
            worksheet: "Sheet1".into(),
        };
        let mut cache: RefCache<String> = RefCache::new();
        cache.fetch_or_insert(&"a".to_string(), || nl.clone());
        cache.fetch_or_insert(&"b".to_string(), || nl.clone());

        assert_eq!(cache.len(), 2);
        // Removing one key must not disturb the other's forward entry.
        cache.remove(&"a".to_string());
        assert_eq!(cache.get(&"b".to_string()), Some(&nl));
    }
}
