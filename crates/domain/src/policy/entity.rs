use serde::{Deserialize, Serialize};

/// An arbiter-managed blocklist the sensor may recommend IPs into.
///
/// The include flags gate which address classes the list applies to; each
/// class carries its own score threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocklist {
    pub id: i64,
    pub name: String,
    #[serde(rename = "shouldIncludePrivateIPs")]
    pub include_private: bool,
    #[serde(rename = "shouldIncludePublicIPs")]
    pub include_public: bool,
    #[serde(rename = "scoreThresholdPrivateIPs")]
    pub threshold_private: i32,
    #[serde(rename = "scoreThresholdPublicIPs")]
    pub threshold_public: i32,
}

/// Outcome of evaluating one IP against one blocklist (or the synthetic
/// "no match" / "error" outcomes, which carry `blocklist` `"None"` /
/// `"N/A"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub block: bool,
    pub reason: String,
    pub blocklist: String,
}

impl Decision {
    /// Non-blocking decision recording a score-lookup failure.
    pub fn lookup_error(message: impl std::fmt::Display) -> Self {
        Self {
            block: false,
            reason: format!("error retrieving score: {message}"),
            blocklist: "N/A".to_string(),
        }
    }

    /// Non-blocking decision: the score met no blocklist threshold.
    pub fn no_match(score: i32) -> Self {
        Self {
            block: false,
            reason: format!("Score {score} did not meet any blocklist threshold"),
            blocklist: "None".to_string(),
        }
    }
}
