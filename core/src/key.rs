//! Keys - Opaque, Typed Slot Names
//!
//! A [`Key<T>`] names one slot in a [`Scratchpad`](crate::Scratchpad).
//! Identity is the freshly minted [`KeyId`], never the display name: two
//! keys both called `"userName"` are different keys.
//!
//! `T` exists only at compile time. It ties a key to the values written
//! through it and to the reads that come back out; the scratchpad itself
//! stores type-erased values.

use crate::error::Failure;
use crate::value::{ScratchValue, StoredValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Uuid);

impl KeyId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key with its value type erased.
///
/// Used wherever keys of different types are collected together: required
/// key sets, provided keys of flow nodes, error messages.
#[derive(Clone)]
pub struct AnyKey {
    id: KeyId,
    name: Arc<str>,
}

impl AnyKey {
    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for AnyKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyKey {}

impl Hash for AnyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// Ordered by name first so key listings read alphabetically. Ids break ties
// between distinct keys that share a name, which keeps this consistent with
// id-only equality.
impl Ord for AnyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for AnyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for AnyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for AnyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<AnyKey> for AnyKey {
    fn as_ref(&self) -> &AnyKey {
        self
    }
}

/// A set of keys, iterated in name order.
pub type KeySet = BTreeSet<AnyKey>;

/// Collect the display names of a key set, in iteration order.
pub fn key_names<'a>(keys: impl IntoIterator<Item = &'a AnyKey>) -> Vec<String> {
    keys.into_iter().map(|key| key.name().to_string()).collect()
}

/// A typed slot name.
pub struct Key<T> {
    inner: AnyKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    /// Mint a new key. Every call produces a distinct identity.
    pub fn named(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            inner: AnyKey {
                id: KeyId::fresh(),
                name: Arc::from(name),
            },
            _marker: PhantomData,
        }
    }

    /// Re-attach a value type to an erased key.
    ///
    /// Only sound when `key` was erased from a `Key<T>`; flows use this to
    /// hand back their typed output key.
    pub(crate) fn from_erased(key: AnyKey) -> Self {
        Self {
            inner: key,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> KeyId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn erased(&self) -> AnyKey {
        self.inner.clone()
    }

    /// A pending write recording that the step producing this key failed.
    pub fn of_failure(&self, reason: impl Into<anyhow::Error>) -> KeyValue {
        KeyValue::failed(self.erased(), Failure::new(reason))
    }
}

impl<T: ScratchValue> Key<T> {
    /// A pending write of `value` under this key.
    pub fn of(&self, value: T) -> KeyValue {
        KeyValue::stored(self.erased(), Arc::new(value))
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<T> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<T> AsRef<AnyKey> for Key<T> {
    fn as_ref(&self) -> &AnyKey {
        &self.inner
    }
}

impl<T> From<&Key<T>> for AnyKey {
    fn from(key: &Key<T>) -> Self {
        key.erased()
    }
}

/// What a pending write stores: a value or a failure reason, never both.
#[derive(Clone)]
pub enum Slot {
    Value(StoredValue),
    Failure(Failure),
}

impl Slot {
    pub fn is_failure(&self) -> bool {
        matches!(self, Slot::Failure(_))
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(value) => f.debug_tuple("Value").field(&(**value).type_name()).finish(),
            Slot::Failure(reason) => f.debug_tuple("Failure").field(reason).finish(),
        }
    }
}

/// A pending write bound to exactly one key.
#[derive(Clone, Debug)]
pub struct KeyValue {
    key: AnyKey,
    slot: Slot,
}

impl KeyValue {
    /// Write an already type-erased value.
    pub fn stored(key: AnyKey, value: StoredValue) -> Self {
        Self {
            key,
            slot: Slot::Value(value),
        }
    }

    pub fn failed(key: AnyKey, reason: Failure) -> Self {
        Self {
            key,
            slot: Slot::Failure(reason),
        }
    }

    pub fn key(&self) -> &AnyKey {
        &self.key
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn is_failure(&self) -> bool {
        self.slot.is_failure()
    }

    pub(crate) fn into_parts(self) -> (AnyKey, Slot) {
        (self.key, self.slot)
    }
}
