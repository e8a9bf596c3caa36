//! Live facility instances keyed by identity.
//!
//! # Responsibilities
//! - Derive identity keys from (name, label)
//! - Hold at most one live instance per key
//! - Reject duplicate registration instead of overwriting

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use heck::ToSnakeCase;
use thiserror::Error;

use crate::facility::Facility;

/// Normalize a facility name for identity and catalog lookup.
///
/// Drops any loader path prefix, splits into lower-case words, removes
/// repeated words and joins with `_`: `"facs/RedisRedis-cache"` becomes
/// `"redis_cache"`.
pub fn normalize_name(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    let snake = base.to_snake_case();

    let mut words: Vec<&str> = Vec::new();
    for word in snake.split('_').filter(|w| !w.is_empty()) {
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words.join("_")
}

/// Identity of a live facility: normalized name plus label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacilityKey(String);

impl FacilityKey {
    pub fn new(name: &str, label: &str) -> Self {
        Self(format!("{}_{}", normalize_name(name), label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[error("facility `{0}` is already registered")]
pub struct DuplicateKey(pub FacilityKey);

/// Owned map of live facilities.
#[derive(Default)]
pub struct FacilityRegistry {
    entries: HashMap<FacilityKey, Box<dyn Facility>>,
}

impl FacilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance and hand it back for starting.
    ///
    /// An existing entry under `key` is left untouched.
    pub fn register(
        &mut self,
        key: FacilityKey,
        facility: Box<dyn Facility>,
    ) -> Result<&mut (dyn Facility + 'static), DuplicateKey> {
        match self.entries.entry(key) {
            Entry::Occupied(existing) => Err(DuplicateKey(existing.key().clone())),
            Entry::Vacant(slot) => Ok(slot.insert(facility).as_mut()),
        }
    }

    /// Remove and return an instance; `None` if it was never registered.
    pub fn unregister(&mut self, key: &FacilityKey) -> Option<Box<dyn Facility>> {
        self.entries.remove(key)
    }

    pub fn lookup(&self, key: &FacilityKey) -> Option<&(dyn Facility + 'static)> {
        self.entries.get(key).map(|f| f.as_ref())
    }

    pub fn lookup_mut(&mut self, key: &FacilityKey) -> Option<&mut (dyn Facility + 'static)> {
        self.entries.get_mut(key).map(|f| f.as_mut())
    }

    pub fn contains(&self, key: &FacilityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<FacilityKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for FacilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacilityRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
