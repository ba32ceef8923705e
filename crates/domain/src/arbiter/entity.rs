use serde::{Deserialize, Serialize};

use crate::common::entity::{Direction, Origin};
use crate::policy::entity::Decision;

/// Alert submission: an observed IP whose effective score crossed the
/// site-wide alert threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "ipType")]
    pub ip_type: Direction,
    pub ip: String,
    #[serde(rename = "relatedIp")]
    pub related_ip: String,
    #[serde(flatten)]
    pub origin: Origin,
}

/// Recommendation submission: ask the arbiter to add `ip` to the named
/// blocklists. Only blocking decisions are carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub ip: String,
    pub decisions: Vec<Decision>,
}

/// Reloadable sensor settings served by the arbiter's `/sync` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub alert_threshold: i32,
    pub sniff_traffic: bool,
    pub run_syslog: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::entity::SourceType;

    #[test]
    fn alert_event_wire_shape() {
        let event = AlertEvent {
            ip_type: Direction::Source,
            ip: "1.2.3.4".to_string(),
            related_ip: "5.6.7.8".to_string(),
            origin: Origin::interface("eth0"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["ipType"], "source");
        assert_eq!(json["ip"], "1.2.3.4");
        assert_eq!(json["relatedIp"], "5.6.7.8");
        assert_eq!(json["sourceType"], "interface");
        assert_eq!(json["sourceName"], "eth0");
    }

    #[test]
    fn alert_event_round_trips() {
        let event = AlertEvent {
            ip_type: Direction::Destination,
            ip: "2.2.2.2".to_string(),
            related_ip: "3.3.3.3".to_string(),
            origin: Origin::syslog("10.0.0.1"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AlertEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.origin.source_type, SourceType::Syslog);
        assert_eq!(back, event);
    }

    #[test]
    fn sync_settings_wire_shape() {
        let settings: SyncSettings = serde_json::from_str(
            r#"{"alertThreshold":50,"sniffTraffic":true,"runSyslog":false}"#,
        )
        .unwrap();
        assert_eq!(settings.alert_threshold, 50);
        assert!(settings.sniff_traffic);
        assert!(!settings.run_syslog);
    }
}
