use std::net::IpAddr;
use std::sync::Arc;

use domain::policy::engine::evaluate_policies;
use domain::policy::entity::Decision;

use crate::policies::PolicyTable;
use crate::scores::ReputationService;

/// Per-IP decision flow: effective score lookup, then policy evaluation.
///
/// A score-lookup failure degrades to a single non-blocking error
/// decision (score 0) instead of propagating — the evaluator must never
/// crash on store trouble.
pub struct DecisionService {
    scores: Arc<ReputationService>,
    policies: Arc<PolicyTable>,
}

impl DecisionService {
    pub fn new(scores: Arc<ReputationService>, policies: Arc<PolicyTable>) -> Self {
        Self { scores, policies }
    }

    pub fn run(&self, addr: IpAddr, ip: &str) -> (Vec<Decision>, i32) {
        let score = match self.scores.lookup(ip) {
            Ok(score) => score,
            Err(e) => {
                tracing::error!(ip, error = %e, "score lookup failed");
                return (vec![Decision::lookup_error(e)], 0);
            }
        };

        let blocklists = self.policies.snapshot();
        let decisions = evaluate_policies(addr, score, &blocklists);
        (decisions, score)
    }
}
