use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use domain::arbiter::entity::{AlertEvent, Recommendation};
use ports::secondary::submission_sink::SubmissionSink;

/// Attempts after which a queued submission is abandoned.
pub const MAX_ATTEMPTS: u32 = 10;

/// First retry happens this long after the submission was queued.
const INITIAL_DELAY: Duration = Duration::from_secs(5);

/// How often the drain loop scans for ready items.
const DRAIN_INTERVAL: Duration = Duration::from_secs(5);

/// Per-item backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// A submission parked for retry.
#[derive(Debug, Clone)]
pub enum Submission {
    Alert(AlertEvent),
    Recommendation(Recommendation),
}

impl Submission {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Alert(_) => "alert",
            Self::Recommendation(_) => "recommendation",
        }
    }
}

#[derive(Debug)]
struct QueuedItem {
    submission: Submission,
    attempts: u32,
    next_retry_at: Instant,
}

/// In-memory queue of rate-limited (or otherwise transiently failed)
/// submissions, drained by a ticker with per-item exponential backoff.
///
/// Items bypass the dedup layer on retry: they were already admitted
/// once, so they go straight to the sink.
pub struct RetryQueue {
    sink: Arc<dyn SubmissionSink>,
    items: Mutex<Vec<QueuedItem>>,
}

impl RetryQueue {
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Self {
        Self {
            sink,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Park a submission; the first retry fires after 5 s.
    pub fn add(&self, submission: Submission) {
        let kind = submission.kind();
        let mut items = self.items.lock().expect("retry queue lock poisoned");
        items.push(QueuedItem {
            submission,
            attempts: 0,
            next_retry_at: Instant::now() + INITIAL_DELAY,
        });
        tracing::info!(kind, queue_size = items.len(), "queued submission for retry");
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("retry queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain loop: scan every 5 s until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("retry queue drain loop stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.process_ready(Instant::now()).await;
                }
            }
        }
    }

    /// Attempt every item whose retry time has passed. Items are taken
    /// out under the lock and processed without it, so submissions never
    /// block `add` callers.
    pub async fn process_ready(&self, now: Instant) {
        let ready: Vec<QueuedItem> = {
            let mut items = self.items.lock().expect("retry queue lock poisoned");
            let mut taken = Vec::new();
            let mut kept = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                if item.next_retry_at <= now {
                    taken.push(item);
                } else {
                    kept.push(item);
                }
            }
            *items = kept;
            taken
        };

        for mut item in ready {
            let result = match &item.submission {
                Submission::Alert(alert) => self.sink.send_alert(alert).await,
                Submission::Recommendation(rec) => self.sink.send_recommendation(rec).await,
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        kind = item.submission.kind(),
                        attempts = item.attempts + 1,
                        "queued submission delivered"
                    );
                }
                Err(e) => {
                    item.attempts += 1;
                    if item.attempts >= MAX_ATTEMPTS {
                        tracing::warn!(
                            kind = item.submission.kind(),
                            attempts = item.attempts,
                            error = %e,
                            "dropping submission after max retries"
                        );
                        continue;
                    }

                    let backoff = backoff_for(item.attempts);
                    item.next_retry_at = now + backoff;
                    tracing::debug!(
                        kind = item.submission.kind(),
                        attempts = item.attempts,
                        retry_in = ?backoff,
                        error = %e,
                        "requeueing submission"
                    );
                    self.items
                        .lock()
                        .expect("retry queue lock poisoned")
                        .push(item);
                }
            }
        }
    }
}

/// 5·2^attempts seconds, capped at five minutes.
fn backoff_for(attempts: u32) -> Duration {
    let exp = attempts.min(10);
    let secs = 5u64.saturating_mul(1u64 << exp);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}
