use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::wire::InstanceId;

/// Tracks runtime generations and which runtime currently owns the debug
/// session. Shared by everything that creates runtimes.
#[derive(Debug)]
pub struct SessionRegistry {
    generation: AtomicU64,
    first_run: AtomicBool,
    active: Mutex<Option<InstanceId>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            first_run: AtomicBool::new(true),
            active: Mutex::new(None),
        }
    }

    /// Allocate the id for a new runtime. Ids strictly increase.
    pub fn next_generation(&self) -> InstanceId {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> InstanceId {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, id: InstanceId) -> bool {
        self.current() == id
    }

    /// Called when a runtime tears down: moves the generation past it and
    /// drops it as the active session.
    pub fn retire(&self, id: InstanceId) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut active) = self.active.lock() {
            if *active == Some(id) {
                *active = None;
            }
        }
    }

    pub fn set_active(&self, id: InstanceId) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(id);
        }
    }

    pub fn active(&self) -> Option<InstanceId> {
        self.active.lock().ok().and_then(|active| *active)
    }

    /// True exactly once per registry: for the first successful connection.
    pub fn take_first_run(&self) -> bool {
        self.first_run.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_clears_only_matching_active() {
        let registry = SessionRegistry::new();
        let first = registry.next_generation();
        registry.set_active(first);
        registry.retire(first + 10);
        assert_eq!(registry.active(), Some(first));
        registry.retire(first);
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn first_run_is_taken_once() {
        let registry = SessionRegistry::new();
        assert!(registry.take_first_run());
        assert!(!registry.take_first_run());
    }
}
