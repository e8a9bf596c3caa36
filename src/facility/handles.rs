//! Typed handles that live facilities share with the ones started after them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::facility::registry::FacilityKey;

/// Shared table of cloneable facility handles, keyed like the registry.
///
/// A factory publishes a handle for the instance it builds; later
/// factories look it up by (name, label) and the concrete handle type.
#[derive(Clone, Default)]
pub struct FacilityHandles {
    inner: Arc<DashMap<FacilityKey, Arc<dyn Any + Send + Sync>>>,
}

impl FacilityHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `handle` under `key`, replacing any earlier one.
    pub fn publish<T: Any + Send + Sync>(&self, key: FacilityKey, handle: T) {
        self.inner.insert(key, Arc::new(handle));
    }

    /// Clone of the handle published for (name, label), if it has type `T`.
    pub fn get<T: Any + Send + Sync + Clone>(&self, name: &str, label: &str) -> Option<T> {
        let entry = self.inner.get(&FacilityKey::new(name, label))?;
        entry.value().downcast_ref::<T>().cloned()
    }

    pub fn contains(&self, key: &FacilityKey) -> bool {
        self.inner.contains_key(key)
    }

    pub(crate) fn withdraw(&self, key: &FacilityKey) {
        self.inner.remove(key);
    }
}

impl fmt::Debug for FacilityHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.inner.iter().map(|e| e.key().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_type() {
        let handles = FacilityHandles::new();
        handles.publish(FacilityKey::new("db", "main"), String::from("pool"));

        assert_eq!(handles.get::<String>("Db", "main").as_deref(), Some("pool"));
        assert_eq!(handles.get::<u32>("db", "main"), None);
        assert_eq!(handles.get::<String>("db", "other"), None);

        handles.withdraw(&FacilityKey::new("db", "main"));
        assert!(!handles.contains(&FacilityKey::new("db", "main")));
    }
}
