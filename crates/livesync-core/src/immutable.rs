//! Structural-sharing containers and copy-on-write transactions.
//!
//! Every container in this module keeps its storage behind an `Arc`.
//! Updating one produces a new container that shares every untouched
//! value with the previous one; a snapshot handed out earlier is never
//! mutated. Consumers detect change with [`Keyed::ptr_eq`] /
//! [`KeySet::ptr_eq`] / `Arc::ptr_eq`, never by comparing contents.
//!
//! # Transactions
//!
//! [`Draft`] groups several edits against one root. The first edit copies
//! the root; nested containers reached through `&mut` copy themselves on
//! first write (`Arc::make_mut`). Anything already copied in the same
//! transaction is uniquely owned by the draft and is edited in place, so
//! an ancestor is copied at most once per transaction.
//!
//! ```
//! use std::sync::Arc;
//! use livesync_core::immutable::{Draft, Keyed};
//!
//! let root = Arc::new(Keyed::<u32>::new().set("a", 1).set("b", 2));
//! let mut draft = Draft::new(&root);
//! draft.edit().insert("a", 10);
//! draft.edit().insert("c", 3);
//! let next = draft.finish();
//!
//! assert_eq!(root.get("a"), Some(&1));
//! assert_eq!(next.get("a"), Some(&10));
//! assert_eq!(next.get("c"), Some(&3));
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Keyed
// ============================================================================

/// Ordered associative container with structural sharing.
///
/// Iteration follows insertion order. Equality compares contents and
/// ignores order; use [`Keyed::ptr_eq`] for change detection.
pub struct Keyed<V>(Arc<IndexMap<String, V>>);

impl<V> Keyed<V> {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self(Arc::new(IndexMap::new()))
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, V> {
        self.0.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, V> {
        self.0.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, V> {
        self.0.values()
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &IndexMap<String, V> {
        &self.0
    }

    /// True when both containers are the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<V: Clone> Keyed<V> {
    /// Returns a new container with `key` set to `value`.
    ///
    /// Every other value is shared with `self`.
    #[must_use]
    pub fn set(&self, key: impl Into<String>, value: V) -> Self {
        let mut next = self.clone();
        next.insert(key, value);
        next
    }

    /// Returns a container without `key`.
    ///
    /// Deleting an absent key returns the identical container.
    #[must_use]
    pub fn delete(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.remove(key);
        next
    }

    /// Shallow-merges `partial` into a copy of this container.
    ///
    /// An empty `partial` returns the identical container.
    #[must_use]
    pub fn assign<K, I>(&self, partial: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut next = self.clone();
        for (key, value) in partial {
            next.insert(key, value);
        }
        next
    }

    /// Sets `key` in place, copying the storage first if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        Arc::make_mut(&mut self.0).insert(key.into(), value)
    }

    /// Removes `key` in place, preserving the order of the remaining keys.
    ///
    /// Storage is only copied when the key is actually present.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).shift_remove(key)
    }

    /// Mutable access to one value, copying the storage first if shared.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        if !self.0.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut self.0).get_mut(key)
    }

    /// Drops every entry for which `keep` returns false.
    ///
    /// Storage is only copied when at least one entry is dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) {
        if self.0.iter().all(|(key, value)| keep(key, value)) {
            return;
        }
        Arc::make_mut(&mut self.0).retain(|key, value| keep(key, value));
    }
}

impl<V> Clone for Keyed<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V> Default for Keyed<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: PartialEq> PartialEq for Keyed<V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl<V: Eq> Eq for Keyed<V> {}

impl<V: fmt::Debug> fmt::Debug for Keyed<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Keyed<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        ))
    }
}

impl<'a, V> IntoIterator for &'a Keyed<V> {
    type Item = (&'a String, &'a V);
    type IntoIter = indexmap::map::Iter<'a, String, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V: Serialize> Serialize for Keyed<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Keyed<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexMap::deserialize(deserializer).map(|map| Self(Arc::new(map)))
    }
}

// ============================================================================
// KeySet
// ============================================================================

/// Ordered set of strings with structural sharing.
pub struct KeySet(Arc<IndexSet<String>>);

impl KeySet {
    pub fn new() -> Self {
        Self(Arc::new(IndexSet::new()))
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::set::Iter<'_, String> {
        self.0.iter()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a set that also holds `value`; identical if already present.
    #[must_use]
    pub fn with(&self, value: &str) -> Self {
        let mut next = self.clone();
        next.insert(value);
        next
    }

    /// Returns a set without `value`; identical if it was absent.
    #[must_use]
    pub fn without(&self, value: &str) -> Self {
        let mut next = self.clone();
        next.remove(value);
        next
    }

    /// Adds `value` in place. Storage is copied only if the value is new.
    pub fn insert(&mut self, value: &str) -> bool {
        if self.0.contains(value) {
            return false;
        }
        Arc::make_mut(&mut self.0).insert(value.to_string())
    }

    /// Removes `value` in place, preserving order of the rest.
    pub fn remove(&mut self, value: &str) -> bool {
        if !self.0.contains(value) {
            return false;
        }
        Arc::make_mut(&mut self.0).shift_remove(value)
    }
}

impl Clone for KeySet {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Default for KeySet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for KeySet {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for KeySet {}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for KeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for KeySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IndexSet::deserialize(deserializer).map(|set| Self(Arc::new(set)))
    }
}

// ============================================================================
// Zone
// ============================================================================

/// Resource collection observed through one source within a tab.
///
/// Browsers report some sources as plain lists of stylesheet urls and
/// others as keyed collections (url → per-item value). Callers read both
/// through [`Zone::resources`] and edit both through [`Zone::with_item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Zone {
    List(Arc<Vec<String>>),
    Keyed(Keyed<String>),
}

impl Zone {
    /// An empty keyed zone.
    pub fn keyed() -> Self {
        Self::Keyed(Keyed::new())
    }

    /// Resource identifiers in this zone: list items, or keys of a keyed zone.
    pub fn resources(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::List(items) => Box::new(items.iter().map(String::as_str)),
            Self::Keyed(items) => Box::new(items.keys().map(String::as_str)),
        }
    }

    /// Looks up one item: by index for a list, by key for a keyed zone.
    pub fn item(&self, key: &str) -> Option<&str> {
        match self {
            Self::List(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .map(String::as_str),
            Self::Keyed(items) => items.get(key).map(String::as_str),
        }
    }

    /// Returns a zone with one item replaced.
    ///
    /// A list zone is addressed by index; an index equal to the length
    /// appends. A key that is not a usable index turns into a no-op for
    /// lists.
    #[must_use]
    pub fn with_item(&self, key: &str, value: String) -> Self {
        match self {
            Self::List(items) => match key.parse::<usize>() {
                Ok(index) if index < items.len() => {
                    let mut next = Arc::clone(items);
                    if let Some(slot) = Arc::make_mut(&mut next).get_mut(index) {
                        *slot = value;
                    }
                    Self::List(next)
                }
                Ok(index) if index == items.len() => {
                    let mut next = Arc::clone(items);
                    Arc::make_mut(&mut next).push(value);
                    Self::List(next)
                }
                _ => self.clone(),
            },
            Self::Keyed(items) => Self::Keyed(items.set(key, value)),
        }
    }
}

impl Default for Zone {
    fn default() -> Self {
        Self::keyed()
    }
}

impl<S: Into<String>> FromIterator<S> for Zone {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::List(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

// ============================================================================
// Draft
// ============================================================================

/// One logical transaction over a shared root.
///
/// Holds the original root for as long as the transaction lives, which
/// guarantees the first write through [`Draft::edit`] (and through any
/// container reached from it) copies instead of mutating shared data.
pub struct Draft<T> {
    original: Arc<T>,
    current: Arc<T>,
}

impl<T: Clone> Draft<T> {
    pub fn new(root: &Arc<T>) -> Self {
        Self {
            original: Arc::clone(root),
            current: Arc::clone(root),
        }
    }

    /// The current value, reflecting edits made so far.
    pub fn get(&self) -> &T {
        &self.current
    }

    /// Mutable access to the root; copies it on the first call only.
    pub fn edit(&mut self) -> &mut T {
        Arc::make_mut(&mut self.current)
    }

    /// True once any edit has been made.
    pub fn updated(&self) -> bool {
        !Arc::ptr_eq(&self.original, &self.current)
    }

    pub fn original(&self) -> &Arc<T> {
        &self.original
    }

    /// Ends the transaction. Returns the original root when nothing was edited.
    pub fn finish(self) -> Arc<T> {
        self.current
    }
}
