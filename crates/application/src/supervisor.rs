use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use ports::secondary::ingest_source::IngestSource;

#[derive(Default)]
struct Slots {
    traffic: Option<CancellationToken>,
    syslog: Option<CancellationToken>,
}

/// Starts and stops the ingest subsystems in response to config deltas.
///
/// Each subsystem gets a child token of the root, so root cancellation
/// always reaches running adapters; children are spawned on the shared
/// task tracker, so shutdown waits for them. The async mutex serializes
/// overlapping reloads.
pub struct IngestSupervisor {
    slots: tokio::sync::Mutex<Slots>,
    root: CancellationToken,
    tracker: TaskTracker,
    traffic_source: Arc<dyn IngestSource>,
    syslog_source: Arc<dyn IngestSource>,
}

impl IngestSupervisor {
    pub fn new(
        root: CancellationToken,
        tracker: TaskTracker,
        traffic_source: Arc<dyn IngestSource>,
        syslog_source: Arc<dyn IngestSource>,
    ) -> Self {
        Self {
            slots: tokio::sync::Mutex::new(Slots::default()),
            root,
            tracker,
            traffic_source,
            syslog_source,
        }
    }

    /// Apply the desired subsystem states. Running subsystems are always
    /// stopped first so a reload with unchanged flags restarts them with
    /// fresh tokens — idempotent in effect, safe under rapid repeats.
    pub async fn reload(&self, sniff_traffic: bool, run_syslog: bool) {
        let mut slots = self.slots.lock().await;

        if let Some(token) = slots.traffic.take() {
            token.cancel();
            tracing::info!("stopped traffic capture");
        }
        if sniff_traffic {
            slots.traffic = Some(self.launch(Arc::clone(&self.traffic_source)));
        }

        if let Some(token) = slots.syslog.take() {
            token.cancel();
            tracing::info!("stopped syslog server");
        }
        if run_syslog {
            slots.syslog = Some(self.launch(Arc::clone(&self.syslog_source)));
        }

        tracing::info!(sniff_traffic, run_syslog, "subsystem reload complete");
    }

    /// Cancel both subsystems without starting replacements.
    pub async fn stop_all(&self) {
        let mut slots = self.slots.lock().await;
        if let Some(token) = slots.traffic.take() {
            token.cancel();
        }
        if let Some(token) = slots.syslog.take() {
            token.cancel();
        }
    }

    fn launch(&self, source: Arc<dyn IngestSource>) -> CancellationToken {
        let token = self.root.child_token();
        let child = token.clone();
        let name = source.name();
        self.tracker.spawn(async move {
            tracing::info!(subsystem = name, "starting ingest adapter");
            source.run(child).await;
            tracing::info!(subsystem = name, "ingest adapter exited");
        });
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Counts starts and clean exits; runs until its token fires.
    struct CountingSource {
        name: &'static str,
        started: AtomicU32,
        stopped: AtomicU32,
    }

    impl CountingSource {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                started: AtomicU32::new(0),
                stopped: AtomicU32::new(0),
            })
        }
    }

    impl IngestSource for CountingSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(
            &self,
            shutdown: CancellationToken,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                shutdown.cancelled().await;
                self.stopped.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn supervisor(
        traffic: Arc<CountingSource>,
        syslog: Arc<CountingSource>,
    ) -> (IngestSupervisor, CancellationToken, TaskTracker) {
        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        let supervisor = IngestSupervisor::new(
            root.clone(),
            tracker.clone(),
            traffic as Arc<dyn IngestSource>,
            syslog as Arc<dyn IngestSource>,
        );
        (supervisor, root, tracker)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn enabling_starts_only_requested_subsystems() {
        let traffic = CountingSource::new("traffic");
        let syslog = CountingSource::new("syslog");
        let (supervisor, _root, _tracker) =
            supervisor(Arc::clone(&traffic), Arc::clone(&syslog));

        supervisor.reload(true, false).await;
        settle().await;

        assert_eq!(traffic.started.load(Ordering::SeqCst), 1);
        assert_eq!(syslog.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn config_change_starts_and_stops_subsystems() {
        let traffic = CountingSource::new("traffic");
        let syslog = CountingSource::new("syslog");
        let (supervisor, _root, _tracker) =
            supervisor(Arc::clone(&traffic), Arc::clone(&syslog));

        // Initial: capture only.
        supervisor.reload(true, false).await;
        settle().await;

        // Syslog flips on: capture restarts (fresh token), syslog starts.
        supervisor.reload(true, true).await;
        settle().await;
        assert_eq!(syslog.started.load(Ordering::SeqCst), 1);
        assert_eq!(traffic.started.load(Ordering::SeqCst), 2);
        assert_eq!(traffic.stopped.load(Ordering::SeqCst), 1);

        // Capture flips off: its token is cancelled, syslog restarts.
        supervisor.reload(false, true).await;
        settle().await;
        assert_eq!(traffic.stopped.load(Ordering::SeqCst), 2);
        assert_eq!(traffic.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rapid_repeated_reloads_serialize() {
        let traffic = CountingSource::new("traffic");
        let syslog = CountingSource::new("syslog");
        let (supervisor, _root, _tracker) =
            supervisor(Arc::clone(&traffic), Arc::clone(&syslog));
        let supervisor = Arc::new(supervisor);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = Arc::clone(&supervisor);
            handles.push(tokio::spawn(async move { s.reload(true, true).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        settle().await;

        // Every reload stopped the previous instance; exactly one of each
        // is left running.
        assert_eq!(traffic.started.load(Ordering::SeqCst), 8);
        assert_eq!(traffic.stopped.load(Ordering::SeqCst), 7);
        assert_eq!(syslog.stopped.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn root_cancellation_reaches_children_and_tracker_joins_them() {
        let traffic = CountingSource::new("traffic");
        let syslog = CountingSource::new("syslog");
        let (supervisor, root, tracker) =
            supervisor(Arc::clone(&traffic), Arc::clone(&syslog));

        supervisor.reload(true, true).await;
        settle().await;

        root.cancel();
        tracker.close();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .expect("children must join after root cancellation");

        assert_eq!(traffic.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(syslog.stopped.load(Ordering::SeqCst), 1);
    }
}
