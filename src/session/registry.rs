use super::SessionHandler;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent map from device identifier to its bound handler.
///
/// No operation holds a shard lock beyond the call itself: lookups clone the
/// `Arc` out, and traversal works on a snapshot so visitors may mutate the
/// registry while iterating.
#[derive(Default)]
pub struct SessionRegistry {
    entries: DashMap<String, Arc<dyn SessionHandler>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `device_id`, returning whatever it replaced.
    ///
    /// The registry does no cleanup; the caller tears down the returned handler.
    pub fn put(
        &self,
        device_id: String,
        handler: Arc<dyn SessionHandler>,
    ) -> Option<Arc<dyn SessionHandler>> {
        self.entries.insert(device_id, handler)
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<dyn SessionHandler>> {
        self.entries
            .get(device_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, device_id: &str) -> Option<Arc<dyn SessionHandler>> {
        self.entries.remove(device_id).map(|(_, handler)| handler)
    }

    /// Remove the entry only if it is still bound to `handler`.
    ///
    /// Returns false when the entry is gone or was superseded meanwhile.
    pub fn remove_if_same(&self, device_id: &str, handler: &Arc<dyn SessionHandler>) -> bool {
        self.entries
            .remove_if(device_id, |_, current| Arc::ptr_eq(current, handler))
            .is_some()
    }

    /// Point-in-time copy of all entries
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn SessionHandler>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Visit every entry of a snapshot taken at call time
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Arc<dyn SessionHandler>),
    {
        for (device_id, handler) in self.snapshot() {
            visitor(&device_id, &handler);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
