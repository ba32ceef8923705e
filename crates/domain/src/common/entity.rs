use serde::{Deserialize, Serialize};

// ── Evaluation direction ────────────────────────────────────────────

/// Which side of an observed traffic pair is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Source,
    Destination,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Destination => "destination",
        };
        f.write_str(s)
    }
}

// ── Ingest origin ───────────────────────────────────────────────────

/// What kind of ingest source produced a traffic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Interface,
    Syslog,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Interface => "interface",
            Self::Syslog => "syslog",
        };
        f.write_str(s)
    }
}

/// Provenance tag attached to every ingest triple: the source kind plus
/// the interface name or syslog peer address it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "sourceType")]
    pub source_type: SourceType,
    #[serde(rename = "sourceName")]
    pub source_name: String,
}

impl Origin {
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Interface,
            source_name: name.into(),
        }
    }

    pub fn syslog(peer: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Syslog,
            source_name: peer.into(),
        }
    }
}
