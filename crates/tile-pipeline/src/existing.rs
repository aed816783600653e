//! Snapshot of keys a sink already holds for one level.

use std::collections::HashSet;
use std::hash::Hash;

use crate::key::WorkKey;

/// Immutable set of stored keys, loaded once per level.
#[derive(Debug, Clone)]
pub struct ExistingSet<S> {
    keys: HashSet<S>,
}

impl<S> Default for ExistingSet<S> {
    fn default() -> Self {
        Self {
            keys: HashSet::new(),
        }
    }
}

impl<S: Eq + Hash> ExistingSet<S> {
    pub fn new(keys: HashSet<S>) -> Self {
        Self { keys }
    }

    pub fn contains(&self, key: &S) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S> FromIterator<S> for ExistingSet<S>
where
    S: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl<S: Eq + Hash + Send + Sync + 'static> ExistingSet<S> {
    /// Lazily drop items whose stored key is already present, calling
    /// `on_skip` for each one dropped. The set is released with the iterator.
    pub fn filter<K, I, F>(self, items: I, mut on_skip: F) -> impl Iterator<Item = K> + Send
    where
        K: WorkKey<Stored = S>,
        I: Iterator<Item = K> + Send,
        F: FnMut(&K) + Send,
    {
        items.filter(move |item| {
            if self.contains(&item.stored_key()) {
                on_skip(item);
                false
            } else {
                true
            }
        })
    }
}
