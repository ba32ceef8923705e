use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::task::TaskTracker;

use adapters::arbiter::{ArbiterApi, UpdateChannel};
use adapters::heartbeat::HeartbeatPinger;
use adapters::ingest::{InterfaceCapture, SyslogServer};
use adapters::storage::RedbScoreStore;
use application::decisions::DecisionService;
use application::dedup::RecommendationCache;
use application::dispatch::{UpdateDispatcher, UPDATE_CHANNEL_CAPACITY};
use application::evaluator::Evaluator;
use application::policies::PolicyTable;
use application::retry_queue::RetryQueue;
use application::scores::ReputationService;
use application::settings::SharedSettings;
use application::submitter::Submitter;
use application::supervisor::IngestSupervisor;
use application::sync::SyncService;
use application::whitelist::WhitelistService;
use domain::arbiter::entity::SyncSettings;
use infrastructure::config::SensorConfig;
use infrastructure::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use infrastructure::logging::init_logging;
use ports::secondary::ingest_source::IngestSource;
use ports::secondary::policy_source::PolicySource;
use ports::secondary::score_store::ScoreStore;
use ports::secondary::submission_sink::SubmissionSink;

use crate::cli::Cli;
use crate::shutdown;

/// Build the whole dependency graph, bootstrap against the arbiter, and
/// run until a termination signal arrives.
pub async fn run(cli: &Cli) -> Result<()> {
    let mut config = SensorConfig::from_env().context("loading configuration")?;
    if cli.debug {
        config.debug = true;
    }
    if let Some(store_path) = &cli.store_path {
        config.store_path = store_path.clone();
    }

    init_logging(config.debug);
    tracing::info!(config = ?config.sanitized(), "traffic sensor starting up");
    if config.log_to_remote {
        tracing::info!(
            address = %config.remote_log_address,
            "remote log shipping is delegated to the log collector"
        );
    }

    let root = shutdown::install();
    let tracker = TaskTracker::new();

    // ── Storage and core services ─────────────────────────────────
    let store = Arc::new(
        RedbScoreStore::open(&config.store_path).context("opening score store")?,
    );
    let scores = Arc::new(ReputationService::new(
        store as Arc<dyn ScoreStore>,
        config.ip_score_cache_size,
    ));
    let whitelist = Arc::new(WhitelistService::new());
    let policies = Arc::new(PolicyTable::new());
    let dedup = Arc::new(RecommendationCache::new(config.recommendations_cache_size));
    let settings = SharedSettings::new(SyncSettings {
        alert_threshold: 0,
        sniff_traffic: false,
        run_syslog: false,
    });

    // ── Arbiter client, retry queue, evaluator ────────────────────
    let api = Arc::new(
        ArbiterApi::new(
            config.arbiter_url.clone(),
            config.auth_secret.clone(),
            config.sensor_name.clone(),
            config.insecure_skip_verify_tls,
        )
        .context("building arbiter client")?,
    );
    let queue = Arc::new(RetryQueue::new(
        Arc::clone(&api) as Arc<dyn SubmissionSink>
    ));
    let submitter = Arc::new(Submitter::new(
        Arc::clone(&api) as Arc<dyn SubmissionSink>,
        Arc::clone(&queue),
    ));
    let decisions = Arc::new(DecisionService::new(
        Arc::clone(&scores),
        Arc::clone(&policies),
    ));
    let evaluator = Arc::new(Evaluator::new(
        decisions,
        Arc::clone(&whitelist),
        Arc::clone(&dedup),
        submitter,
        settings.clone(),
    ));

    // ── Ingest subsystems under the supervisor ────────────────────
    let capture = Arc::new(InterfaceCapture::new(Arc::clone(&evaluator)));
    let syslog = Arc::new(SyslogServer::new(
        config.syslog_listen_addr.clone(),
        config.syslog_port,
        Arc::clone(&evaluator),
    ));
    let supervisor = Arc::new(IngestSupervisor::new(
        root.clone(),
        tracker.clone(),
        capture as Arc<dyn IngestSource>,
        syslog as Arc<dyn IngestSource>,
    ));

    let sync = Arc::new(SyncService::new(
        Arc::clone(&api) as Arc<dyn PolicySource>,
        Arc::clone(&scores),
        whitelist,
        policies,
        settings,
        supervisor,
    ));

    // Initial sync is fatal on failure: without policy state the sensor
    // would evaluate traffic blind.
    sync.bootstrap().await.context("startup sync failed")?;

    // ── Long-lived loops ──────────────────────────────────────────
    let (update_tx, update_rx) = tokio::sync::mpsc::channel(UPDATE_CHANNEL_CAPACITY);

    let dispatcher = Arc::new(UpdateDispatcher::new(
        Arc::clone(&sync),
        Arc::clone(&scores),
        Arc::clone(&dedup),
    ));
    dispatcher.spawn_workers(update_rx, &tracker, root.clone());

    let updates = UpdateChannel::new(
        config.arbiter_host.clone(),
        config.insecure_skip_verify_tls,
        config.auth_secret.clone(),
        config.sensor_name.clone(),
        config.ws_keepalive_period,
        update_tx,
    );
    let updates_token = root.clone();
    tracker.spawn(async move { updates.run(updates_token).await });

    let drain_queue = Arc::clone(&queue);
    let drain_token = root.clone();
    tracker.spawn(async move { drain_queue.run(drain_token).await });

    let periodic_sync = Arc::clone(&sync);
    let sync_token = root.clone();
    tracker.spawn(async move { periodic_sync.run_periodic(sync_token).await });

    if config.heartbeat_identifier.is_empty() {
        tracing::info!("no heartbeat identifier configured, heartbeats disabled");
    } else {
        let pinger = HeartbeatPinger::new(
            config.heartbeat_url.clone(),
            config.heartbeat_identifier.clone(),
            config.auth_secret.clone(),
        )
        .map_err(anyhow::Error::msg)
        .context("building heartbeat pinger")?;
        let heartbeat_token = root.clone();
        tracker.spawn(async move { pinger.run(heartbeat_token).await });
    }

    tracing::info!("traffic sensor running");

    // ── Shutdown ──────────────────────────────────────────────────
    root.cancelled().await;
    tracing::info!("waiting for tasks to finish");
    tracker.close();
    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!("tasks did not finish within the shutdown window");
    }
    tracing::info!("all tasks finished, exiting");

    Ok(())
}
