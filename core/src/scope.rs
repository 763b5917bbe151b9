//! Per-(user, project, tree) scope mutex registry (§5 concurrency model).
//!
//! Operations targeting the same scope are linearizable; cross-scope
//! operations are independent. This is new infrastructure the spec's
//! ordering guarantees require but that no single teacher file
//! implements directly — grounded loosely on the lock-striping pattern
//! used for the teacher's database connection pool (one mutex per
//! logical resource, acquired for the operation's duration).

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ScopeKey {
    pub user_id: String,
    pub project_id: String,
    pub tree_id: String,
}

impl ScopeKey {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        tree_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            tree_id: tree_id.into(),
        }
    }
}

/// Registry of per-scope mutexes, plus one process-wide mutex for the
/// global project registry file.
#[derive(Debug, Default)]
pub struct ScopeLocks {
    scopes: Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>,
    registry: Arc<Mutex<()>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self {
            scopes: Mutex::new(HashMap::new()),
            registry: Arc::new(Mutex::new(())),
        }
    }

    /// Acquire (creating if absent) the mutex guarding `key`.
    pub async fn lock_for(&self, key: ScopeKey) -> Arc<Mutex<()>> {
        let mut scopes = self.scopes.lock().await;
        scopes.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// The single process-wide registry mutex (for `projects.json`).
    pub fn registry_lock(&self) -> Arc<Mutex<()>> {
        self.registry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn distinct_scopes_get_distinct_locks() {
        let locks = ScopeLocks::new();
        let a = locks.lock_for(ScopeKey::new("u", "p", "main")).await;
        let b = locks.lock_for(ScopeKey::new("u", "p", "feature")).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn same_scope_reuses_lock() {
        let locks = ScopeLocks::new();
        let a = locks.lock_for(ScopeKey::new("u", "p", "main")).await;
        let b = locks.lock_for(ScopeKey::new("u", "p", "main")).await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
