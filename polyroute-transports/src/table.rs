use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

/// Route-dispatch table shared by every instance of a socket-style
/// transport variant in the process.
///
/// Entries are keyed `"<method>:<path>"`. Registration is an upsert: a
/// later `register` for a live key silently replaces the handler.
/// The table also owns the subscribe-once latch for the variant's
/// connection listener, so the latch cannot drift apart from the state it
/// guards.
pub struct DispatchTable<H> {
    entries: RwLock<HashMap<String, H>>,
    subscribed: Mutex<bool>,
}

impl<H: Clone> DispatchTable<H> {
    pub fn new() -> Self {
        DispatchTable {
            entries: RwLock::new(HashMap::new()),
            subscribed: Mutex::new(false),
        }
    }

    pub fn register(&self, key: impl Into<String>, handler: H) {
        self.entries.write().insert(key.into(), handler);
    }

    pub fn unregister(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn resolve(&self, key: &str) -> Option<H> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run `subscribe` the first time this is called on the table and
    /// never again, no matter how many transport instances are built on
    /// top of it. Returns whether it ran.
    pub fn subscribe_once<F: FnOnce()>(&self, subscribe: F) -> bool {
        let mut latch = self.subscribed.lock();
        if *latch {
            return false;
        }
        subscribe();
        *latch = true;
        true
    }

    pub fn is_subscribed(&self) -> bool {
        *self.subscribed.lock()
    }
}

impl<H: Clone> Default for DispatchTable<H> {
    fn default() -> Self {
        DispatchTable::new()
    }
}
