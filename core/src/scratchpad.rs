//! Scratchpad - Write-Once Key/Value Store
//!
//! The scratchpad is the state threaded through a run. It never changes in
//! place: [`Scratchpad::with`] hands back a new scratchpad sharing nothing
//! mutable with the old one.
//!
//! A [`locked`](Scratchpad::locked) scratchpad additionally refuses to
//! overwrite any key it already holds, which is what gives a run its
//! single-writer-per-key discipline.

use crate::error::{Failure, ScratchpadError};
use crate::key::{AnyKey, Key, KeyId, KeySet, KeyValue, Slot};
use ahash::{AHashSet, RandomState};
use serde_json::{Value, json};
use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

type EntryMap = HashMap<KeyId, Entry, RandomState>;

#[derive(Clone)]
struct Entry {
    key: AnyKey,
    slot: Slot,
}

/// Immutable, copy-on-write key/value store.
#[derive(Clone, Default)]
pub struct Scratchpad {
    entries: Arc<EntryMap>,
    locked: bool,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unlocked scratchpad from initial writes.
    pub fn from_values(values: impl IntoIterator<Item = KeyValue>) -> Self {
        let mut entries = EntryMap::default();
        for value in values {
            let (key, slot) = value.into_parts();
            entries.insert(key.id(), Entry { key, slot });
        }
        Self {
            entries: Arc::new(entries),
            locked: false,
        }
    }

    /// Return a new scratchpad holding these entries plus `values`.
    ///
    /// Unlocked, later writes win. Locked, any write to a key that is already
    /// present (or written twice in this batch) fails the whole call and
    /// `self` is left as it was.
    pub fn with(&self, values: impl IntoIterator<Item = KeyValue>) -> Result<Self, ScratchpadError> {
        let values: Vec<KeyValue> = values.into_iter().collect();

        if self.locked {
            let mut seen = AHashSet::with_capacity(values.len());
            let clashes: Vec<String> = values
                .iter()
                .map(KeyValue::key)
                .filter(|key| self.entries.contains_key(&key.id()) || !seen.insert(key.id()))
                .map(|key| key.name().to_string())
                .collect();
            if !clashes.is_empty() {
                return Err(ScratchpadError::LockedOverwrite(clashes));
            }
        }

        let mut entries = EntryMap::clone(&self.entries);
        for value in values {
            let (key, slot) = value.into_parts();
            entries.insert(key.id(), Entry { key, slot });
        }
        Ok(Self {
            entries: Arc::new(entries),
            locked: self.locked,
        })
    }

    /// Shorthand for [`with`](Self::with) on a single write.
    pub fn with_value(&self, value: KeyValue) -> Result<Self, ScratchpadError> {
        self.with(std::iter::once(value))
    }

    /// The same entries, with the overwrite guard switched on.
    pub fn locked(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            locked: true,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Read a value.
    ///
    /// Fails with [`ScratchpadError::Missing`] when nothing was written for
    /// the key, and with [`ScratchpadError::Failed`] when the step that
    /// provides it recorded a failure.
    pub fn get<T: 'static>(&self, key: &Key<T>) -> Result<&T, ScratchpadError> {
        let entry = self.entry(key.as_ref())?;
        match &entry.slot {
            Slot::Value(value) => (**value)
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| ScratchpadError::TypeMismatch {
                    key: key.name().to_string(),
                    expected: type_name::<T>(),
                }),
            Slot::Failure(reason) => Err(ScratchpadError::Failed {
                key: key.name().to_string(),
                reason: reason.clone(),
            }),
        }
    }

    /// Read a value, treating absent keys and failures alike as `None`.
    pub fn try_get<T: 'static>(&self, key: &Key<T>) -> Option<&T> {
        self.get(key).ok()
    }

    pub fn contains<K: AsRef<AnyKey> + ?Sized>(&self, key: &K) -> bool {
        self.entries.contains_key(&key.as_ref().id())
    }

    /// Whether the key holds a value rather than a failure.
    pub fn is_successful<K: AsRef<AnyKey> + ?Sized>(
        &self,
        key: &K,
    ) -> Result<bool, ScratchpadError> {
        Ok(!self.entry(key.as_ref())?.slot.is_failure())
    }

    /// The failure recorded under a key.
    pub fn failure_reason<K: AsRef<AnyKey> + ?Sized>(
        &self,
        key: &K,
    ) -> Result<Failure, ScratchpadError> {
        let key = key.as_ref();
        match &self.entry(key)?.slot {
            Slot::Failure(reason) => Ok(reason.clone()),
            Slot::Value(_) => Err(ScratchpadError::NotAFailure(key.name().to_string())),
        }
    }

    /// Raw access to what a key holds.
    pub fn slot<K: AsRef<AnyKey> + ?Sized>(&self, key: &K) -> Option<&Slot> {
        self.entries
            .get(&key.as_ref().id())
            .map(|entry| &entry.slot)
    }

    pub fn keys(&self) -> KeySet {
        self.entries.values().map(|entry| entry.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structural copy of every entry.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.entries
                .values()
                .map(|entry| (entry.key.clone(), snapshot_slot(&entry.slot)))
                .collect(),
        )
    }

    fn entry(&self, key: &AnyKey) -> Result<&Entry, ScratchpadError> {
        self.entries
            .get(&key.id())
            .ok_or_else(|| ScratchpadError::Missing(key.name().to_string()))
    }
}

fn snapshot_slot(slot: &Slot) -> Value {
    match slot {
        Slot::Value(value) => (**value).snapshot(),
        Slot::Failure(reason) => json!({ "failure": reason.to_string() }),
    }
}

impl fmt::Debug for Scratchpad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys();
        let mut entries = f.debug_map();
        for key in &keys {
            if let Some(slot) = self.slot(key) {
                entries.entry(&key.name(), slot);
            }
        }
        entries.finish()?;
        if self.locked {
            f.write_str(" (locked)")?;
        }
        Ok(())
    }
}

/// Structural copy of a scratchpad, for detecting in-place mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot(BTreeMap<AnyKey, Value>);

impl Snapshot {
    /// Names of keys present here whose value differs (or vanished) in `later`.
    pub fn changed_keys(&self, later: &Snapshot) -> Vec<String> {
        self.0
            .iter()
            .filter(|(key, before)| later.0.get(*key) != Some(*before))
            .map(|(key, _)| key.name().to_string())
            .collect()
    }

    pub fn get(&self, key: &AnyKey) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_with_is_copy_on_write() {
        let name = Key::<String>::named("userName");
        let age = Key::<u32>::named("age");

        let first = Scratchpad::from_values([name.of("Fred".into())]);
        let second = first.with([age.of(42)]).unwrap();

        assert_eq!(first.len(), 1);
        assert!(!first.contains(&age));
        assert_eq!(second.get(&name).unwrap(), "Fred");
        assert_eq!(*second.get(&age).unwrap(), 42);
    }

    #[test]
    fn test_unlocked_overwrite_wins() {
        let count = Key::<u32>::named("count");
        let pad = Scratchpad::from_values([count.of(1)]);
        let pad = pad.with([count.of(2)]).unwrap();
        assert_eq!(*pad.get(&count).unwrap(), 2);
    }

    #[test]
    fn test_locked_rejects_overwrite_and_keeps_original() {
        let k = Key::<String>::named("K");
        let k2 = Key::<String>::named("K2");
        let locked = Scratchpad::from_values([k.of("v1".into())]).locked();

        let err = locked.with([k.of("v2".into())]).unwrap_err();
        assert!(matches!(err, ScratchpadError::LockedOverwrite(ref keys) if keys == &["K"]));
        assert_eq!(locked.get(&k).unwrap(), "v1");
        assert_eq!(locked.len(), 1);

        let extended = locked.with([k2.of("v".into())]).unwrap();
        assert!(extended.is_locked());
        assert_eq!(extended.get(&k).unwrap(), "v1");
        assert_eq!(extended.get(&k2).unwrap(), "v");
        assert!(!locked.contains(&k2));
    }

    #[test]
    fn test_locked_rejects_whole_batch() {
        let k = Key::<u32>::named("K");
        let fresh = Key::<u32>::named("fresh");
        let locked = Scratchpad::from_values([k.of(1)]).locked();

        assert!(locked.with([fresh.of(1), k.of(2)]).is_err());
        assert!(locked.with([fresh.of(1), fresh.of(2)]).is_err());
        assert!(!locked.contains(&fresh));
    }

    #[test]
    fn test_missing_and_failed_are_distinct() {
        let present = Key::<u32>::named("present");
        let failed = Key::<u32>::named("failed");
        let absent = Key::<u32>::named("absent");
        let pad = Scratchpad::from_values([
            present.of(7),
            failed.of_failure(anyhow::anyhow!("no stock")),
        ]);

        assert!(matches!(pad.get(&absent), Err(ScratchpadError::Missing(ref k)) if k == "absent"));
        match pad.get(&failed) {
            Err(ScratchpadError::Failed { key, reason }) => {
                assert_eq!(key, "failed");
                assert_eq!(reason.to_string(), "no stock");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(pad.is_successful(&present).unwrap());
        assert!(!pad.is_successful(&failed).unwrap());
        assert!(matches!(
            pad.is_successful(&absent),
            Err(ScratchpadError::Missing(_))
        ));

        assert_eq!(pad.failure_reason(&failed).unwrap().to_string(), "no stock");
        assert!(matches!(
            pad.failure_reason(&present),
            Err(ScratchpadError::NotAFailure(_))
        ));
        assert!(matches!(
            pad.failure_reason(&absent),
            Err(ScratchpadError::Missing(_))
        ));
    }

    #[test]
    fn test_snapshot_detects_interior_mutation() {
        let basket = Key::<Mutex<Vec<String>>>::named("basket");
        let pad = Scratchpad::from_values([basket.of(Mutex::new(vec!["apple".into()]))]);

        let before = pad.snapshot();
        assert!(before.changed_keys(&pad.snapshot()).is_empty());

        pad.get(&basket).unwrap().lock().unwrap().push("pear".into());
        assert_eq!(before.changed_keys(&pad.snapshot()), vec!["basket"]);
    }

    #[test]
    fn test_debug_lists_entries() {
        let flag = Key::<bool>::named("flag");
        let pad = Scratchpad::from_values([flag.of(true)]).locked();
        let rendered = format!("{pad:?}");
        assert!(rendered.contains("flag"));
        assert!(rendered.ends_with("(locked)"));
    }
}
