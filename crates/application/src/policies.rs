use std::sync::{Arc, RwLock};

use domain::policy::entity::Blocklist;

/// In-memory snapshot of the active blocklist policies, replaced
/// wholesale on every sync and shared read-mostly with evaluations.
pub struct PolicyTable {
    current: RwLock<Arc<Vec<Blocklist>>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Blocklist>> {
        Arc::clone(&self.current.read().expect("policy table lock poisoned"))
    }

    pub fn replace(&self, blocklists: Vec<Blocklist>) {
        *self.current.write().expect("policy table lock poisoned") = Arc::new(blocklists);
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}
