use std::future::Future;
use std::pin::Pin;

use domain::arbiter::entity::SyncSettings;
use domain::arbiter::error::ArbiterError;
use domain::policy::entity::Blocklist;
use domain::score::entity::{ScoreRecord, ScoreUpdate};

/// Secondary port for pulling configuration and reputation state from the
/// arbiter's sync endpoints.
pub trait PolicySource: Send + Sync {
    /// `GET /sync`: the reloadable sensor settings.
    fn fetch_sensor_config(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SyncSettings, ArbiterError>> + Send + '_>>;

    /// `GET /sync/blocklist`: the full active blocklist set.
    fn fetch_blocklists(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Blocklist>, ArbiterError>> + Send + '_>>;

    /// `GET /sync/whitelist`: whitelist CIDRs as strings (invalid entries
    /// are the caller's concern).
    fn fetch_whitelist(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, ArbiterError>> + Send + '_>>;

    /// `GET /sync/score`: the full score snapshot (gzip+tar archive,
    /// decoded by the implementation).
    fn fetch_score_snapshot(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreRecord>, ArbiterError>> + Send + '_>>;

    /// `GET /score-updates`: the incremental score feed, possibly with
    /// several entries per IP.
    fn fetch_score_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ScoreUpdate>, ArbiterError>> + Send + '_>>;
}
