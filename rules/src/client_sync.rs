//! ClientSync (§4.10): client registration, authentication, rate
//! limiting, and push/pull/bidirectional/merge synchronization between
//! two rule libraries.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use orchestrator_core::error::{OrchestratorError, Result};

use crate::composer::RuleComposer;
use crate::models::{
    ClientConfig, ClientStatus, CompositionStrategy, ConflictStrategy, RuleConflict, RuleFile,
    SyncOperation, SyncResult,
};
use crate::store::RuleStore;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Receives sync completion events. A failing subscriber must never
/// prevent the others from being notified.
#[async_trait]
pub trait SyncSubscriber: Send + Sync {
    async fn notify(&self, event: &SyncEvent) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub client_id: String,
    pub operation: SyncOperation,
    pub changes_applied: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncAnalytics {
    pub total_clients: usize,
    pub currently_rate_limited: usize,
    pub total_syncs: u64,
}

pub struct ClientSync {
    clients: Mutex<HashMap<String, ClientConfig>>,
    rate_windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    statuses: Mutex<HashMap<String, ClientStatus>>,
    sync_counts: Mutex<HashMap<String, u64>>,
    subscribers: Mutex<Vec<Arc<dyn SyncSubscriber>>>,
}

impl Default for ClientSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientSync {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            rate_windows: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            sync_counts: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub async fn register_client(&self, config: ClientConfig) -> Result<()> {
        if config.secret.is_empty() {
            return Err(OrchestratorError::Validation(
                "client secret must not be empty".into(),
            ));
        }
        let id = config.id.clone();
        self.statuses.lock().await.insert(
            id.clone(),
            ClientStatus {
                id: id.clone(),
                last_sync: None,
                pending_requests: 0,
                rate_limited: false,
            },
        );
        self.clients.lock().await.insert(id, config);
        Ok(())
    }

    pub async fn authenticate(&self, client_id: &str, credential: &str) -> Result<bool> {
        let clients = self.clients.lock().await;
        let config = clients
            .get(client_id)
            .ok_or_else(|| OrchestratorError::AuthFailure(format!("unknown client {client_id}")))?;
        Ok(match config.auth_method {
            crate::models::AuthMethod::ApiKey
            | crate::models::AuthMethod::Token
            | crate::models::AuthMethod::Certificate => credential == config.secret,
            crate::models::AuthMethod::OAuth2 => !credential.is_empty(),
        })
    }

    /// Sliding 60-second window; returns an error once the client's
    /// configured per-minute budget is exhausted.
    async fn check_rate_limit(&self, client_id: &str, limit: u32) -> Result<()> {
        let mut windows = self.rate_windows.lock().await;
        let window = windows.entry(client_id.to_string()).or_default();
        let now = Instant::now();
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) > RATE_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() as u32 >= limit {
            let mut statuses = self.statuses.lock().await;
            if let Some(status) = statuses.get_mut(client_id) {
                status.rate_limited = true;
            }
            return Err(OrchestratorError::RateLimited(format!(
                "client {client_id} exceeded {limit} requests/minute"
            )));
        }
        window.push_back(now);
        let mut statuses = self.statuses.lock().await;
        if let Some(status) = statuses.get_mut(client_id) {
            status.rate_limited = false;
        }
        Ok(())
    }

    pub async fn status(&self, client_id: &str) -> Result<ClientStatus> {
        self.statuses
            .lock()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::AuthFailure(format!("unknown client {client_id}")))
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn SyncSubscriber>) {
        self.subscribers.lock().await.push(subscriber);
    }

    pub async fn analytics(&self) -> SyncAnalytics {
        let clients = self.clients.lock().await;
        let statuses = self.statuses.lock().await;
        let counts = self.sync_counts.lock().await;
        SyncAnalytics {
            total_clients: clients.len(),
            currently_rate_limited: statuses.values().filter(|s| s.rate_limited).count(),
            total_syncs: counts.values().sum(),
        }
    }

    /// Compares two rule libraries and reports rules that differ at
    /// the same relative path.
    pub async fn diff(local: &RuleStore, remote: &RuleStore) -> Result<Vec<RuleConflict>> {
        let local_snapshot = snapshot(local).await?;
        let remote_snapshot = snapshot(remote).await?;
        let mut conflicts = Vec::new();
        for (rel, local_file) in &local_snapshot {
            if let Some(remote_file) = remote_snapshot.get(rel) {
                if local_file.raw_content != remote_file.raw_content {
                    conflicts.push(RuleConflict {
                        path: rel.clone(),
                        client_version: local_file.raw_content.clone(),
                        server_version: remote_file.raw_content.clone(),
                        auto_resolvable: true,
                    });
                }
            }
        }
        Ok(conflicts)
    }

    /// Resolves diffed conflicts into the rule content that should win
    /// at each path, dispatching to the same strategies the composer
    /// uses for N-way composition.
    pub fn resolve_conflicts(
        conflicts: &[RuleConflict],
        strategy: ConflictStrategy,
        local: &BTreeMap<PathBuf, RuleFile>,
        remote: &BTreeMap<PathBuf, RuleFile>,
    ) -> Vec<(PathBuf, String)> {
        conflicts
            .iter()
            .map(|conflict| {
                let resolved = match strategy {
                    ConflictStrategy::Override => conflict.client_version.clone(),
                    ConflictStrategy::Append => {
                        format!("{}\n\n{}", conflict.server_version, conflict.client_version)
                    }
                    ConflictStrategy::Manual => conflict.server_version.clone(),
                    ConflictStrategy::Merge => {
                        match (local.get(&conflict.path), remote.get(&conflict.path)) {
                            (Some(l), Some(r)) => RuleComposer::compose_many(
                                &[l.clone(), r.clone()],
                                CompositionStrategy::Intelligent,
                                l.format,
                            )
                            .content,
                            _ => conflict.client_version.clone(),
                        }
                    }
                };
                (conflict.path.clone(), resolved)
            })
            .collect()
    }

    /// Runs a sync operation for an authenticated, rate-limited client.
    pub async fn sync(
        &self,
        client_id: &str,
        operation: SyncOperation,
        local: &RuleStore,
        remote: &RuleStore,
    ) -> Result<SyncResult> {
        let start = Instant::now();
        let config = {
            let clients = self.clients.lock().await;
            clients
                .get(client_id)
                .cloned()
                .ok_or_else(|| OrchestratorError::AuthFailure(format!("unknown client {client_id}")))?
        };
        if !config.sync_permissions.contains(&operation) {
            return Err(OrchestratorError::AuthFailure(format!(
                "client {client_id} is not permitted to {operation:?}"
            )));
        }
        self.check_rate_limit(client_id, config.rate_limit_per_minute).await?;

        let mut result = SyncResult::default();
        let local_snapshot = snapshot(local).await?;
        let remote_snapshot = snapshot(remote).await?;

        match operation {
            SyncOperation::Push => {
                copy_missing_or_changed(&local_snapshot, &remote_snapshot, remote, &mut result).await?;
            }
            SyncOperation::Pull => {
                copy_missing_or_changed(&remote_snapshot, &local_snapshot, local, &mut result).await?;
            }
            SyncOperation::Bidirectional => {
                copy_missing_or_changed(&local_snapshot, &remote_snapshot, remote, &mut result).await?;
                copy_missing_or_changed(&remote_snapshot, &local_snapshot, local, &mut result).await?;
            }
            SyncOperation::Merge => {
                for (rel, local_file) in &local_snapshot {
                    if let Some(remote_file) = remote_snapshot.get(rel) {
                        if local_file.raw_content != remote_file.raw_content {
                            let merged = RuleComposer::compose_many(
                                &[local_file.clone(), remote_file.clone()],
                                CompositionStrategy::Intelligent,
                                local_file.format,
                            );
                            write_rel(local, rel, &merged.content).await?;
                            write_rel(remote, rel, &merged.content).await?;
                            result.processed_rules.push(rel.clone());
                            result.changes_applied += 1;
                        }
                    }
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;

        {
            let mut statuses = self.statuses.lock().await;
            if let Some(status) = statuses.get_mut(client_id) {
                status.last_sync = Some(Utc::now());
            }
        }
        *self.sync_counts.lock().await.entry(client_id.to_string()).or_insert(0) += 1;

        let event = SyncEvent {
            client_id: client_id.to_string(),
            operation,
            changes_applied: result.changes_applied,
        };
        let subscribers = self.subscribers.lock().await.clone();
        for subscriber in subscribers {
            if let Err(err) = subscriber.notify(&event).await {
                result.warnings.push(format!("subscriber notification failed: {err}"));
            }
        }

        Ok(result)
    }
}

async fn snapshot(store: &RuleStore) -> Result<BTreeMap<PathBuf, RuleFile>> {
    let mut map = BTreeMap::new();
    for file in store.load_all().await? {
        let relative = file
            .path
            .strip_prefix(store.root())
            .unwrap_or(&file.path)
            .to_path_buf();
        map.insert(relative, file);
    }
    Ok(map)
}

async fn write_rel(store: &RuleStore, relative: &PathBuf, content: &str) -> Result<()> {
    let target = store.root().join(relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, content).await?;
    Ok(())
}

async fn copy_missing_or_changed(
    source: &BTreeMap<PathBuf, RuleFile>,
    destination: &BTreeMap<PathBuf, RuleFile>,
    destination_store: &RuleStore,
    result: &mut SyncResult,
) -> Result<()> {
    for (rel, file) in source {
        let needs_copy = match destination.get(rel) {
            Some(existing) => existing.raw_content != file.raw_content,
            None => true,
        };
        if needs_copy {
            write_rel(destination_store, rel, &file.raw_content).await?;
            result.processed_rules.push(rel.clone());
            result.changes_applied += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(id: &str, limit: u32) -> ClientConfig {
        ClientConfig {
            id: id.to_string(),
            name: id.to_string(),
            auth_method: AuthMethod::ApiKey,
            secret: "s3cret".to_string(),
            sync_permissions: vec![
                SyncOperation::Push,
                SyncOperation::Pull,
                SyncOperation::Bidirectional,
                SyncOperation::Merge,
            ],
            rate_limit_per_minute: limit,
            sync_frequency_seconds: 60,
            allowed_rule_types: Vec::new(),
            auto_sync: false,
            default_conflict_resolution: ConflictStrategy::Override,
        }
    }

    #[tokio::test]
    async fn register_and_authenticate() {
        let sync = ClientSync::new();
        sync.register_client(config("c1", 10)).await.unwrap();
        assert!(sync.authenticate("c1", "s3cret").await.unwrap());
        assert!(!sync.authenticate("c1", "wrong").await.unwrap());
    }

    #[tokio::test]
    async fn rate_limit_trips_after_budget_exhausted() {
        let sync = ClientSync::new();
        sync.register_client(config("c1", 2)).await.unwrap();
        sync.check_rate_limit("c1", 2).await.unwrap();
        sync.check_rate_limit("c1", 2).await.unwrap();
        assert!(sync.check_rate_limit("c1", 2).await.is_err());
        assert!(sync.status("c1").await.unwrap().rate_limited);
    }

    #[tokio::test]
    async fn push_copies_local_only_files_to_remote() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(local_dir.path().join("rule.mdc"), "# Rule\nbody\n")
            .await
            .unwrap();
        let local = RuleStore::new(local_dir.path());
        let remote = RuleStore::new(remote_dir.path());

        let sync = ClientSync::new();
        sync.register_client(config("c1", 100)).await.unwrap();
        let result = sync.sync("c1", SyncOperation::Push, &local, &remote).await.unwrap();
        assert_eq!(result.changes_applied, 1);
        assert!(remote_dir.path().join("rule.mdc").exists());
    }

    #[tokio::test]
    async fn merge_combines_diverging_content_on_both_sides() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(local_dir.path().join("rule.mdc"), "# Rules\nlocal body\n")
            .await
            .unwrap();
        tokio::fs::write(remote_dir.path().join("rule.mdc"), "# Rules\nremote body\n")
            .await
            .unwrap();
        let local = RuleStore::new(local_dir.path());
        let remote = RuleStore::new(remote_dir.path());

        let sync = ClientSync::new();
        sync.register_client(config("c1", 100)).await.unwrap();
        let result = sync.sync("c1", SyncOperation::Merge, &local, &remote).await.unwrap();
        assert_eq!(result.changes_applied, 1);
        let merged = tokio::fs::read_to_string(local_dir.path().join("rule.mdc")).await.unwrap();
        assert!(merged.contains("local body"));
        assert!(merged.contains("remote body"));
    }

    #[tokio::test]
    async fn subscriber_failure_does_not_block_others() {
        struct Failing;
        #[async_trait]
        impl SyncSubscriber for Failing {
            async fn notify(&self, _event: &SyncEvent) -> Result<()> {
                Err(OrchestratorError::IOFailure("boom".into()))
            }
        }
        struct Counting(Arc<AtomicUsize>);
        #[async_trait]
        impl SyncSubscriber for Counting {
            async fn notify(&self, _event: &SyncEvent) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let sync = ClientSync::new();
        sync.register_client(config("c1", 100)).await.unwrap();
        sync.subscribe(Arc::new(Failing)).await;
        sync.subscribe(Arc::new(Counting(counter.clone()))).await;

        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        let local = RuleStore::new(local_dir.path());
        let remote = RuleStore::new(remote_dir.path());
        let result = sync.sync("c1", SyncOperation::Push, &local, &remote).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.warnings.len(), 1);
    }
}
