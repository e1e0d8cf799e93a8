#![forbid(unsafe_code)]

//! Ordered set of candidate verification keys.

use crate::key::Key;

/// Keys to try, in order, when checking a signature.
///
/// Slots may be empty (for example a trust store entry whose certificate
/// could not be loaded). Empty slots are skipped during verification.
#[derive(Debug, Clone, Default)]
pub struct KeyCandidateSet {
    slots: Vec<Option<Key>>,
}

impl KeyCandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding a single key.
    pub fn single(key: Key) -> Self {
        Self {
            slots: vec![Some(key)],
        }
    }

    pub fn push(&mut self, key: Key) {
        self.slots.push(Some(key));
    }

    /// Append an empty slot.
    pub fn push_none(&mut self) {
        self.slots.push(None);
    }

    /// Append a slot that may be empty.
    pub fn push_slot(&mut self, key: Option<Key>) {
        self.slots.push(key);
    }

    /// The present keys, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.slots.iter().flatten()
    }

    /// Number of slots, empty ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<Key> for KeyCandidateSet {
    fn from(key: Key) -> Self {
        Self::single(key)
    }
}

impl FromIterator<Option<Key>> for KeyCandidateSet {
    fn from_iter<I: IntoIterator<Item = Option<Key>>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<Key> for KeyCandidateSet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        iter.into_iter().map(Some).collect()
    }
}
