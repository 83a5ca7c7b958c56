// Named Registry - process-wide name -> weak reference lookup

use crate::domain::{QueueError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Name -> non-owning reference table
///
/// Holds only `Weak` references, so presence in the registry never extends
/// a value's life. Dead entries are left in place and read as absent; a dead
/// entry is overwritten when its name is registered again.
///
/// The table has its own lock. Values are constructed under it by `make`
/// callbacks, which must not take any other lock.
pub struct Registry<T> {
    entries: Mutex<HashMap<String, Weak<T>>>,
    counter: AtomicU64,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Weak<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new value under an explicit name
    ///
    /// # Errors
    /// - `QueueError::InvalidName` if the name is empty or contains a NUL byte
    /// - `QueueError::DuplicateName` if a live value already holds the name
    pub fn insert_named<F>(&self, name: &str, make: F) -> Result<Arc<T>>
    where
        F: FnOnce(String) -> T,
    {
        if name.is_empty() || name.contains('\0') {
            return Err(QueueError::InvalidName(name.to_string()));
        }

        let mut entries = self.entries();
        if entries.get(name).is_some_and(is_live) {
            return Err(QueueError::DuplicateName(name.to_string()));
        }

        let value = Arc::new(make(name.to_string()));
        entries.insert(name.to_string(), Arc::downgrade(&value));
        Ok(value)
    }

    /// Register a new value under `prefix` + a process-unique counter
    ///
    /// Skips generated names that a live value registered explicitly.
    pub fn insert_generated<F>(&self, prefix: &str, make: F) -> Arc<T>
    where
        F: FnOnce(String) -> T,
    {
        let mut entries = self.entries();
        let name = loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let candidate = format!("{prefix}{n}");
            if !entries.get(&candidate).is_some_and(is_live) {
                break candidate;
            }
        };

        let value = Arc::new(make(name.clone()));
        entries.insert(name, Arc::downgrade(&value));
        value
    }

    /// Promote the entry for `name`, if its value is still alive
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries().get(name).and_then(Weak::upgrade)
    }

    /// Names of all live values, sorted
    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live<T>(weak: &Weak<T>) -> bool {
    weak.strong_count() > 0
}
