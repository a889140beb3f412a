//! Status registry for tracking live session assignments
//!
//! Every scan records which egress its identity is bound to. The snapshot is
//! served for observability and can be fed back into
//! [`ResourceStore::reconcile`](crate::storage::ResourceStore::reconcile)
//! after a crash. Updates are last-write-wins; readers may see slightly
//! stale data.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::StatusEntry;

/// Registry of identities currently bound to an egress point
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    entries: Arc<RwLock<HashMap<String, StatusEntry>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the assignment for an identity
    pub async fn assign(&self, entry: StatusEntry) {
        let mut entries = self.entries.write().await;
        entries.insert(entry.account_name.clone(), entry);
    }

    /// Forget an identity's assignment
    pub async fn remove(&self, account_name: &str) -> Option<StatusEntry> {
        let mut entries = self.entries.write().await;
        entries.remove(account_name)
    }

    /// Forget an assignment without waiting for the lock
    ///
    /// Returns `false` when the registry is busy and nothing was removed.
    pub fn try_remove(&self, account_name: &str) -> bool {
        match self.entries.try_write() {
            Ok(mut entries) => {
                entries.remove(account_name);
                true
            }
            Err(_) => false,
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn get(&self, account_name: &str) -> Option<StatusEntry> {
        let entries = self.entries.read().await;
        entries.get(account_name).cloned()
    }

    /// All assignments, ordered by identity name
    pub async fn snapshot(&self) -> Vec<StatusEntry> {
        let entries = self.entries.read().await;
        let mut list: Vec<StatusEntry> = entries.values().cloned().collect();
        list.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        list
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
