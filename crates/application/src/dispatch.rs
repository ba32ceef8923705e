use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use domain::score::entity::ScoreUpdate;

use crate::dedup::RecommendationCache;
use crate::scores::ReputationService;
use crate::sync::SyncService;

/// Number of dispatch workers draining the update channel — one per
/// update kind, matching the arbiter's four push types.
pub const UPDATE_WORKERS: usize = 4;

/// Capacity of the bounded ingress channel between the WebSocket read
/// loop and the dispatch workers.
pub const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// A raw push message from the arbiter: a kind tag plus an opaque JSON
/// payload interpreted per kind.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Drains pushed updates and applies them to local state. Parse failures
/// drop the single update; unknown kinds are logged and dropped; the
/// stream continues either way.
pub struct UpdateDispatcher {
    sync: Arc<SyncService>,
    scores: Arc<ReputationService>,
    dedup: Arc<RecommendationCache>,
}

impl UpdateDispatcher {
    pub fn new(
        sync: Arc<SyncService>,
        scores: Arc<ReputationService>,
        dedup: Arc<RecommendationCache>,
    ) -> Self {
        Self {
            sync,
            scores,
            dedup,
        }
    }

    /// Spawn the worker pool on the shared tracker. Workers share the
    /// receiver behind an async mutex; each locks only long enough to
    /// take one message.
    pub fn spawn_workers(
        self: Arc<Self>,
        rx: mpsc::Receiver<Update>,
        tracker: &TaskTracker,
        shutdown: CancellationToken,
    ) {
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..UPDATE_WORKERS {
            let dispatcher = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                loop {
                    let update = tokio::select! {
                        () = shutdown.cancelled() => break,
                        update = async { rx.lock().await.recv().await } => update,
                    };
                    match update {
                        Some(update) => dispatcher.handle(update, worker_id).await,
                        None => break,
                    }
                }
                tracing::debug!(worker_id, "update worker exiting");
            });
        }
    }

    pub async fn handle(&self, update: Update, worker_id: usize) {
        tracing::debug!(worker_id, kind = %update.kind, "processing update");
        match update.kind.as_str() {
            "score-update" => {
                let parsed: ScoreUpdate = match serde_json::from_value(update.data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to parse score-update");
                        return;
                    }
                };
                tracing::info!(ip = %parsed.ip, score = parsed.score, "processing score-update");
                match self.scores.apply_update(parsed) {
                    Ok(ip) => self.dedup.purge_ip(&ip),
                    Err(e) => tracing::error!(error = %e, "failed to apply score update"),
                }
            }
            "blocklist-update" => {
                if let Err(e) = self.sync.sync_blocklists().await {
                    tracing::error!(error = %e, "failed to re-sync blocklists");
                    return;
                }
                // Suppression decisions made against the old policy set
                // no longer hold.
                self.dedup.clear();
            }
            "whitelist-update" => {
                if let Err(e) = self.sync.sync_whitelist().await {
                    tracing::error!(error = %e, "failed to re-sync whitelist");
                }
            }
            "config-update" => {
                if let Err(e) = self.sync.sync_sensor_config().await {
                    tracing::error!(error = %e, "failed to re-sync sensor config");
                }
            }
            other => {
                tracing::warn!(kind = other, "unknown update type received");
            }
        }
    }
}
