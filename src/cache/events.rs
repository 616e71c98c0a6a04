//! Cache Events Module
//!
//! Informational notifications about the size of the cache.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A write pushed the running total above the ceiling
    CeilingReached { current_size: u64, max_size: u64 },
    /// A trim finished
    Resized { new_size: u64, max_size: Option<u64> },
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

// == Event Bus ==
/// Registry of event listeners; listeners run on the emitting thread.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn emit(&self, event: CacheEvent) {
        // Clone out so a listener may subscribe without deadlocking
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
