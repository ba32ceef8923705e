use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use domain::common::error::DomainError;
use domain::score::entity::{ScoreRecord, ScoreUpdate};
use ports::secondary::policy_source::PolicySource;

use crate::policies::PolicyTable;
use crate::scores::ReputationService;
use crate::settings::SharedSettings;
use crate::supervisor::IngestSupervisor;
use crate::whitelist::WhitelistService;

/// How often the reconciliation loop re-pulls state the push channel may
/// have missed.
const SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Pull-side synchronization against the arbiter: bootstrap, per-kind
/// re-pulls for push notifications, and the hourly reconciliation loop.
pub struct SyncService {
    source: Arc<dyn PolicySource>,
    scores: Arc<ReputationService>,
    whitelist: Arc<WhitelistService>,
    policies: Arc<PolicyTable>,
    settings: SharedSettings,
    supervisor: Arc<IngestSupervisor>,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn PolicySource>,
        scores: Arc<ReputationService>,
        whitelist: Arc<WhitelistService>,
        policies: Arc<PolicyTable>,
        settings: SharedSettings,
        supervisor: Arc<IngestSupervisor>,
    ) -> Self {
        Self {
            source,
            scores,
            whitelist,
            policies,
            settings,
            supervisor,
        }
    }

    /// Re-pull `/sync` and apply it: update the alert threshold and, when
    /// the subsystem flags changed, reload the ingest supervisor.
    pub async fn sync_sensor_config(&self) -> Result<(), DomainError> {
        let fetched = self.source.fetch_sensor_config().await?;
        let current = self.settings.get();

        self.settings.replace(fetched);
        tracing::info!(threshold = fetched.alert_threshold, "stored alert threshold");

        if fetched.sniff_traffic != current.sniff_traffic
            || fetched.run_syslog != current.run_syslog
        {
            self.supervisor
                .reload(fetched.sniff_traffic, fetched.run_syslog)
                .await;
        }

        Ok(())
    }

    /// Re-pull the blocklist set. The dedup cache is reset by the update
    /// dispatcher when this runs in response to a push, since previous
    /// suppression decisions were made against the old policy.
    pub async fn sync_blocklists(&self) -> Result<(), DomainError> {
        let blocklists = self.source.fetch_blocklists().await?;
        tracing::info!(count = blocklists.len(), "stored blocklists");
        self.policies.replace(blocklists);
        Ok(())
    }

    /// Re-pull and rebuild the whitelist trie.
    pub async fn sync_whitelist(&self) -> Result<(), DomainError> {
        let cidrs = self.source.fetch_whitelist().await?;
        let loaded = self.whitelist.replace(&cidrs);
        tracing::info!(
            received = cidrs.len(),
            loaded,
            "whitelist synced"
        );
        Ok(())
    }

    /// Pull the full score snapshot archive and mirror it locally.
    pub async fn sync_score_snapshot(&self) -> Result<(), DomainError> {
        let records = self.source.fetch_score_snapshot().await?;
        tracing::info!(count = records.len(), "processed score snapshot");
        self.scores.bulk_upsert(&records)?;
        Ok(())
    }

    /// Pull the incremental score feed, keep the latest entry per IP, and
    /// apply it (cache entries for affected IPs are invalidated).
    pub async fn resync_score_updates(&self) -> Result<(), DomainError> {
        let updates = self.source.fetch_score_updates().await?;
        let records = dedup_latest(updates);
        tracing::info!(count = records.len(), "applied incremental score updates");
        self.scores.bulk_upsert(&records)?;
        Ok(())
    }

    /// Startup synchronization. Any failure here is fatal: the sensor
    /// must not evaluate traffic against empty policy state.
    pub async fn bootstrap(&self) -> Result<(), DomainError> {
        self.sync_sensor_config().await?;
        self.sync_score_snapshot().await?;
        self.sync_blocklists().await?;
        self.sync_whitelist().await?;
        tracing::info!("sensor bootstrapped");
        Ok(())
    }

    /// Hourly reconciliation in case the push channel dropped updates.
    /// Individual failures are logged; the loop keeps running.
    pub async fn run_periodic(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        // The bootstrap already synced; skip the immediate first tick.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("sync loop exiting");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_sensor_config().await {
                        tracing::error!(error = %e, "failed to sync sensor config");
                    }
                    if let Err(e) = self.sync_whitelist().await {
                        tracing::error!(error = %e, "failed to sync whitelist");
                    }
                    if let Err(e) = self.sync_blocklists().await {
                        tracing::error!(error = %e, "failed to sync blocklists");
                    }
                    if let Err(e) = self.resync_score_updates().await {
                        tracing::error!(error = %e, "failed to resync scores");
                    }
                }
            }
        }
    }
}

/// Collapse an incremental feed to the newest record per IP. Entries
/// without a timestamp count as "now", i.e. newest.
fn dedup_latest(updates: Vec<ScoreUpdate>) -> Vec<ScoreRecord> {
    let now = Utc::now();
    let mut latest: HashMap<String, ScoreRecord> = HashMap::new();
    for update in updates {
        let record = update.into_record(now);
        match latest.get(&record.ip) {
            Some(existing) if existing.updated_at > record.updated_at => {}
            _ => {
                latest.insert(record.ip.clone(), record);
            }
        }
    }
    latest.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use chrono::TimeDelta;
    use domain::arbiter::entity::SyncSettings;
    use domain::policy::entity::Blocklist;
    use ports::secondary::ingest_source::IngestSource;
    use ports::secondary::score_store::ScoreStore;
    use ports::test_utils::{MemoryScoreStore, StaticPolicySource};
    use tokio_util::task::TaskTracker;

    struct IdleSource(&'static str);

    impl IngestSource for IdleSource {
        fn name(&self) -> &'static str {
            self.0
        }
        fn run(
            &self,
            shutdown: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move { shutdown.cancelled().await })
        }
    }

    struct Fixture {
        source: Arc<StaticPolicySource>,
        store: Arc<MemoryScoreStore>,
        scores: Arc<ReputationService>,
        whitelist: Arc<WhitelistService>,
        policies: Arc<PolicyTable>,
        settings: SharedSettings,
        sync: SyncService,
    }

    fn fixture(settings: SyncSettings) -> Fixture {
        let source = Arc::new(StaticPolicySource::new(settings));
        let store = Arc::new(MemoryScoreStore::new());
        let scores = Arc::new(ReputationService::new(
            Arc::clone(&store) as Arc<dyn ScoreStore>,
            64,
        ));
        let whitelist = Arc::new(WhitelistService::new());
        let policies = Arc::new(PolicyTable::new());
        let shared = SharedSettings::new(SyncSettings {
            alert_threshold: 0,
            sniff_traffic: false,
            run_syslog: false,
        });
        let supervisor = Arc::new(IngestSupervisor::new(
            CancellationToken::new(),
            TaskTracker::new(),
            Arc::new(IdleSource("traffic")),
            Arc::new(IdleSource("syslog")),
        ));
        let sync = SyncService::new(
            Arc::clone(&source) as Arc<dyn PolicySource>,
            Arc::clone(&scores),
            Arc::clone(&whitelist),
            Arc::clone(&policies),
            shared.clone(),
            supervisor,
        );
        Fixture {
            source,
            store,
            scores,
            whitelist,
            policies,
            settings: shared,
            sync,
        }
    }

    #[tokio::test]
    async fn sensor_config_updates_threshold() {
        let fx = fixture(SyncSettings {
            alert_threshold: 65,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.sync.sync_sensor_config().await.unwrap();
        assert_eq!(fx.settings.alert_threshold(), 65);
    }

    #[tokio::test]
    async fn blocklist_sync_replaces_table() {
        let fx = fixture(SyncSettings {
            alert_threshold: 0,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.source.blocklists.lock().unwrap().push(Blocklist {
            id: 1,
            name: "BL1".to_string(),
            include_private: false,
            include_public: true,
            threshold_private: 80,
            threshold_public: 40,
        });
        fx.sync.sync_blocklists().await.unwrap();
        assert_eq!(fx.policies.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn whitelist_sync_rebuilds_trie() {
        let fx = fixture(SyncSettings {
            alert_threshold: 0,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.source
            .whitelist
            .lock()
            .unwrap()
            .push("10.0.0.0/8".to_string());
        fx.sync.sync_whitelist().await.unwrap();
        assert!(fx.whitelist.contains("10.1.2.3"));
    }

    #[tokio::test]
    async fn snapshot_sync_mirrors_scores() {
        let fx = fixture(SyncSettings {
            alert_threshold: 0,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.source
            .snapshot
            .lock()
            .unwrap()
            .push(ScoreRecord::new("1.2.3.4", 42, Utc::now()));
        fx.sync.sync_score_snapshot().await.unwrap();
        assert_eq!(fx.scores.lookup("1.2.3.4").unwrap(), 42);
        assert_eq!(fx.store.record_count(), 1);
    }

    #[tokio::test]
    async fn incremental_resync_applies_updates() {
        let fx = fixture(SyncSettings {
            alert_threshold: 0,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.source
            .updates
            .lock()
            .unwrap()
            .push(("5.5.5.5".to_string(), 33));
        fx.sync.resync_score_updates().await.unwrap();
        assert_eq!(fx.scores.lookup("5.5.5.5").unwrap(), 33);
    }

    #[tokio::test]
    async fn bootstrap_runs_all_syncs() {
        let fx = fixture(SyncSettings {
            alert_threshold: 55,
            sniff_traffic: false,
            run_syslog: false,
        });
        fx.source
            .snapshot
            .lock()
            .unwrap()
            .push(ScoreRecord::new("1.2.3.4", 10, Utc::now()));
        fx.source
            .whitelist
            .lock()
            .unwrap()
            .push("192.168.0.0/16".to_string());

        fx.sync.bootstrap().await.unwrap();

        assert_eq!(fx.settings.alert_threshold(), 55);
        assert!(fx.whitelist.contains("192.168.1.1"));
        assert_eq!(fx.scores.lookup("1.2.3.4").unwrap(), 10);
    }

    #[test]
    fn dedup_latest_keeps_newest_per_ip() {
        let now = Utc::now();
        let updates = vec![
            ScoreUpdate {
                ip: "1.1.1.1".to_string(),
                score: 10,
                timestamp: Some(now - TimeDelta::hours(2)),
            },
            ScoreUpdate {
                ip: "1.1.1.1".to_string(),
                score: 20,
                timestamp: Some(now - TimeDelta::hours(1)),
            },
            ScoreUpdate {
                ip: "2.2.2.2".to_string(),
                score: 30,
                timestamp: Some(now - TimeDelta::hours(3)),
            },
        ];
        let records = dedup_latest(updates);
        assert_eq!(records.len(), 2);
        let one = records.iter().find(|r| r.ip == "1.1.1.1").unwrap();
        assert_eq!(one.score, 20);
    }

    #[test]
    fn dedup_latest_missing_timestamp_wins_over_old() {
        let now = Utc::now();
        let updates = vec![
            ScoreUpdate {
                ip: "1.1.1.1".to_string(),
                score: 10,
                timestamp: Some(now - TimeDelta::hours(2)),
            },
            ScoreUpdate {
                ip: "1.1.1.1".to_string(),
                score: 99,
                timestamp: None,
            },
        ];
        let records = dedup_latest(updates);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 99);
    }
}
