use std::net::IpAddr;

use crate::policy::classify::is_private;
use crate::policy::entity::{Blocklist, Decision};

/// Evaluate an effective score against the active blocklist policies.
///
/// A blocklist is skipped when its include flags exclude the address
/// class; otherwise the class-specific threshold applies and a blocking
/// decision is produced when `score >= threshold`. If nothing blocks, a
/// single non-blocking "no match" decision is returned so callers always
/// see at least one decision.
pub fn evaluate_policies(ip: IpAddr, score: i32, blocklists: &[Blocklist]) -> Vec<Decision> {
    let private = is_private(ip);
    let mut decisions = Vec::new();

    for bl in blocklists {
        if private && !bl.include_private {
            continue;
        }
        if !private && !bl.include_public {
            continue;
        }

        let threshold = if private {
            bl.threshold_private
        } else {
            bl.threshold_public
        };

        if score >= threshold {
            decisions.push(Decision {
                block: true,
                reason: format!("Score {score} >= threshold {threshold}"),
                blocklist: bl.name.clone(),
            });
        }
    }

    if decisions.is_empty() {
        decisions.push(Decision::no_match(score));
    }

    decisions
}
