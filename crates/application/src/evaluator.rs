use std::net::IpAddr;
use std::sync::Arc;

use domain::arbiter::entity::{AlertEvent, Recommendation};
use domain::common::entity::{Direction, Origin};
use domain::policy::entity::Decision;

use crate::decisions::DecisionService;
use crate::dedup::{dedup_key, RecommendationCache};
use crate::settings::SharedSettings;
use crate::submitter::Submitter;
use crate::whitelist::WhitelistService;

/// Orchestrates the per-IP evaluation flow:
/// parse → score + decisions → alert at threshold → blocking decisions →
/// dedup → recommend. Holds no mutable state of its own, only handles.
pub struct Evaluator {
    decisions: Arc<DecisionService>,
    whitelist: Arc<WhitelistService>,
    dedup: Arc<RecommendationCache>,
    submitter: Arc<Submitter>,
    settings: SharedSettings,
}

impl Evaluator {
    pub fn new(
        decisions: Arc<DecisionService>,
        whitelist: Arc<WhitelistService>,
        dedup: Arc<RecommendationCache>,
        submitter: Arc<Submitter>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            decisions,
            whitelist,
            dedup,
            submitter,
            settings,
        }
    }

    /// Ingest-boundary pre-filter: a traffic pair is skipped entirely
    /// when either side is whitelisted.
    pub fn should_process(&self, src: &str, dst: &str) -> bool {
        if self.whitelist.contains(src) {
            tracing::debug!(src, "source IP whitelisted, skipping pair");
            return false;
        }
        if self.whitelist.contains(dst) {
            tracing::debug!(dst, "destination IP whitelisted, skipping pair");
            return false;
        }
        true
    }

    /// Evaluate both directions of an observed pair as independent tasks.
    /// Pairs with a whitelisted side are dropped here, so evaluation
    /// never sees a whitelisted IP.
    pub fn spawn_pair(self: Arc<Self>, src: String, dst: String, origin: Origin) {
        if !self.should_process(&src, &dst) {
            return;
        }

        let this = Arc::clone(&self);
        let (src_clone, dst_clone, origin_clone) = (src.clone(), dst.clone(), origin.clone());
        tokio::spawn(async move {
            this.evaluate(Direction::Source, &src_clone, &dst_clone, origin_clone)
                .await;
        });

        tokio::spawn(async move {
            self.evaluate(Direction::Destination, &dst, &src, origin).await;
        });
    }

    /// Evaluate a single IP. `related_ip` is the other side of the pair,
    /// carried through to the alert payload.
    pub async fn evaluate(&self, direction: Direction, ip: &str, related_ip: &str, origin: Origin) {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            tracing::debug!(ip, "not a valid IP address, skipping");
            return;
        };

        let (decisions, score) = self.decisions.run(addr, ip);

        if score >= self.settings.alert_threshold() {
            let alert = AlertEvent {
                ip_type: direction,
                ip: ip.to_string(),
                related_ip: related_ip.to_string(),
                origin,
            };
            if let Err(e) = self.submitter.alert(alert).await {
                tracing::error!(ip, error = %e, "failed to send alert");
            }
        }

        let blocks: Vec<Decision> = decisions.into_iter().filter(|d| d.block).collect();
        if blocks.is_empty() {
            tracing::debug!(ip, score, "no blocking decision");
            return;
        }

        let key = dedup_key(ip, &blocks);
        if self.dedup.contains(&key) {
            tracing::debug!(ip, "duplicate recommendation suppressed");
            return;
        }
        self.dedup.insert(key);

        let recommendation = Recommendation {
            ip: ip.to_string(),
            decisions: blocks,
        };
        if let Err(e) = self.submitter.recommend(recommendation).await {
            tracing::error!(ip, error = %e, "failed to send recommendation");
        }
    }
}
