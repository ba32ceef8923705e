//! Shared test doubles for the secondary ports, available to downstream
//! crates via the `test-utils` feature.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use domain::arbiter::entity::{AlertEvent, Recommendation, SyncSettings};
use domain::arbiter::error::ArbiterError;
use domain::policy::entity::Blocklist;
use domain::score::entity::{ScoreRecord, ScoreUpdate};
use domain::score::error::ScoreError;

use crate::secondary::policy_source::PolicySource;
use crate::secondary::score_store::ScoreStore;
use crate::secondary::submission_sink::SubmissionSink;

// ── Score store ─────────────────────────────────────────────────────

/// In-memory `ScoreStore` that counts point lookups, so cache-hit
/// behaviour is observable.
#[derive(Default)]
pub struct MemoryScoreStore {
    records: Mutex<HashMap<String, ScoreRecord>>,
    gets: AtomicU32,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ScoreRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock().unwrap();
            for record in records {
                map.insert(record.ip.clone(), record);
            }
        }
        store
    }

    /// Number of `get` calls that reached the store (cache misses).
    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl ScoreStore for MemoryScoreStore {
    fn get(&self, ip: &str) -> Result<Option<ScoreRecord>, ScoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.lock().unwrap().get(ip).cloned())
    }

    fn upsert(&self, record: &ScoreRecord) -> Result<(), ScoreError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.ip.clone(), record.clone());
        Ok(())
    }

    fn bulk_upsert(&self, records: &[ScoreRecord]) -> Result<(), ScoreError> {
        let mut map = self.records.lock().unwrap();
        for record in records {
            map.insert(record.ip.clone(), record.clone());
        }
        Ok(())
    }
}

/// `ScoreStore` whose every operation fails, for error-path tests.
pub struct FailingScoreStore;

impl ScoreStore for FailingScoreStore {
    fn get(&self, _ip: &str) -> Result<Option<ScoreRecord>, ScoreError> {
        Err(ScoreError::Store("injected failure".to_string()))
    }

    fn upsert(&self, _record: &ScoreRecord) -> Result<(), ScoreError> {
        Err(ScoreError::Store("injected failure".to_string()))
    }

    fn bulk_upsert(&self, _records: &[ScoreRecord]) -> Result<(), ScoreError> {
        Err(ScoreError::Store("injected failure".to_string()))
    }
}

// ── Submission sink ─────────────────────────────────────────────────

/// Recording `SubmissionSink` with scriptable per-call outcomes.
///
/// Every delivered submission is recorded (including failed attempts).
/// Outcomes are popped from the scripted queues; an empty queue means
/// success.
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<AlertEvent>>,
    recommendations: Mutex<Vec<Recommendation>>,
    alert_outcomes: Mutex<VecDeque<Result<(), ArbiterError>>>,
    recommendation_outcomes: Mutex<VecDeque<Result<(), ArbiterError>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_alert(&self, outcome: Result<(), ArbiterError>) {
        self.alert_outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn script_recommendation(&self, outcome: Result<(), ArbiterError>) {
        self.recommendation_outcomes
            .lock()
            .unwrap()
            .push_back(outcome);
    }

    pub fn rate_limited() -> ArbiterError {
        ArbiterError::RateLimited {
            message: "too many requests".to_string(),
        }
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.recommendations.lock().unwrap().clone()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }

    pub fn recommendation_count(&self) -> usize {
        self.recommendations.lock().unwrap().len()
    }
}

impl SubmissionSink for RecordingSink {
    fn send_alert<'a>(
        &'a self,
        alert: &'a AlertEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            self.alerts.lock().unwrap().push(alert.clone());
            self.alert_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        })
    }

    fn send_recommendation<'a>(
        &'a self,
        recommendation: &'a Recommendation,
    ) -> Pin<Box<dyn Future<Output = Result<(), ArbiterError>> + Send + 'a>> {
        Box::pin(async move {
            self.recommendations
                .lock()
                .unwrap()
                .push(recommendation.clone());
            self.recommendation_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        })
    }
}

// ── Policy source ───────────────────────────────────────────────────

/// `PolicySource` serving fixed data, mutable between calls.
pub struct StaticPolicySource {
    pub settings: Mutex<SyncSettings>,
    pub blocklists: Mutex<Vec<Blocklist>>,
    pub whitelist: Mutex<Vec<String>>,
    pub snapshot: Mutex<Vec<ScoreRecord>>,
    pub updates: Mutex<Vec<(String, i32)>>,
}

impl StaticPolicySource {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            blocklists: Mutex::new(Vec::new()),
            whitelist: Mutex::new(Vec::new()),
            snapshot: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_settings(&self, settings: SyncSettings) {
        *self.settings.lock().unwrap() = settings;
    }
}

impl PolicySource for StaticPolicySource {
    fn fetch_sensor_config(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SyncSettings, ArbiterError>> + Send + '_>> {
        let settings = *self.settings.lock().unwrap();
        Box::pin(async move { Ok(settings) })
    }

    fn fetch_blocklists(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Blocklist>, ArbiterError>> + Send + '_>> {
        let blocklists = self.blocklists.lock().unwrap().clone();
        Box::pin(async move { Ok(blocklists) })
    }

    fn fetch_whitelist(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ArbiterError>> + Send + '_>> {
        let whitelist = self.whitelist.lock().unwrap().clone();
        Box::pin(async move { Ok(whitelist) })
    }

    fn fetch_score_snapshot(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreRecord>, ArbiterError>> + Send + '_>> {
        let snapshot = self.snapshot.lock().unwrap().clone();
        Box::pin(async move { Ok(snapshot) })
    }

    fn fetch_score_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreUpdate>, ArbiterError>> + Send + '_>> {
        let updates: Vec<ScoreUpdate> = self
            .updates
            .lock()
            .unwrap()
            .iter()
            .map(|(ip, score)| ScoreUpdate {
                ip: ip.clone(),
                score: *score,
                timestamp: None,
            })
            .collect();
        Box::pin(async move { Ok(updates) })
    }
}
