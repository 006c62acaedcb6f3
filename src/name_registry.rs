//! Unique-name vending, owned by each `RootObject`.
//!
//! The id counter is the same atomic-counter idiom used for object ids in
//! `graph_object.rs`, but scoped per `RootObject` instance rather than
//! process-global: a World and its Scenes each mint their own auto-names
//! independently, and a restarted Scene starts its counter back at one
//! rather than inheriting whatever the World last handed out.

use std::sync::atomic::{AtomicU64, Ordering};

/// Vends process-unique-enough auto-generated names (`"{prefix}_{n}"`) and
/// raw id numbers, scoped to the owning `RootObject`.
#[derive(Debug, Default)]
pub struct NameRegistry {
    counter: AtomicU64,
}

impl NameRegistry {
    /// Creates a registry whose counter starts at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }

    /// Returns the next id, never repeating for this registry's lifetime.
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds an auto-generated name of the form `"{prefix}_{n}"` using the
    /// next id. The caller is still responsible for checking the name isn't
    /// already taken in the owning registry (auto-names and explicit names
    /// share one namespace).
    pub fn unique_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_never_repeat() {
        let registry = NameRegistry::new();
        let a = registry.unique_name("camera");
        let b = registry.unique_name("camera");
        assert_ne!(a, b);
    }

    #[test]
    fn counter_starts_at_one() {
        let registry = NameRegistry::new();
        assert_eq!(registry.next_id(), 1);
        assert_eq!(registry.next_id(), 2);
    }
}
