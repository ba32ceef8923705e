//! Extraction of (src, dst) address pairs from syslog message bodies.
//!
//! Firewalls and routers log in wildly different shapes; we recognize the
//! two common structured forms (CEF-style `src=`/`dst=` fields and Cisco
//! IOS `a.b.c.d(p) -> e.f.g.h(q)`) and fall back to scanning for the
//! first plausible pair of distinct IPv4 literals.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::OnceLock;

use regex::Regex;

fn cef_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"src=(\d+\.\d+\.\d+\.\d+)").expect("static regex"))
}

fn cef_dst_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"dst=(\d+\.\d+\.\d+\.\d+)").expect("static regex"))
}

fn cisco_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+\.\d+\.\d+\.\d+)\(\d+\)\s*->\s*(\d+\.\d+\.\d+\.\d+)\(\d+\)")
            .expect("static regex")
    })
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("static regex"))
}

/// CEF-style `src=1.2.3.4 ... dst=5.6.7.8`.
fn extract_cef(msg: &str) -> Option<(String, String)> {
    let src = cef_src_re().captures(msg)?.get(1)?.as_str().to_string();
    let dst = cef_dst_re().captures(msg)?.get(1)?.as_str().to_string();
    Some((src, dst))
}

/// Cisco IOS style `1.2.3.4(1024) -> 5.6.7.8(80)`.
fn extract_cisco(msg: &str) -> Option<(String, String)> {
    let captures = cisco_re().captures(msg)?;
    Some((
        captures.get(1)?.as_str().to_string(),
        captures.get(2)?.as_str().to_string(),
    ))
}

/// All valid IPv4 literals in the message, in order of appearance.
fn extract_ips(msg: &str) -> Vec<String> {
    ipv4_re()
        .find_iter(msg)
        .filter(|m| m.as_str().parse::<Ipv4Addr>().is_ok())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True for addresses that can never be a meaningful traffic endpoint:
/// unspecified, broadcast, loopback, multicast, and link-local. The
/// cloud metadata address 169.254.169.254 is deliberately allowed —
/// traffic toward it is exactly what a sensor should see.
fn is_reserved(ip_str: &str) -> bool {
    let Ok(ip) = ip_str.parse::<IpAddr>() else {
        return true;
    };
    match ip {
        IpAddr::V4(v4) => {
            if v4 == Ipv4Addr::new(169, 254, 169, 254) {
                return false;
            }
            v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_loopback()
                || v4.is_multicast()
                || v4.is_link_local()
        }
        IpAddr::V6(v6) => {
            let seg = v6.segments();
            let link_local = (seg[0] & 0xffc0) == 0xfe80;
            v6.is_unspecified() || v6.is_loopback() || v6.is_multicast() || link_local
        }
    }
}

/// Both sides present, distinct, and routable.
fn validate_pair(src: &str, dst: &str) -> Option<(String, String)> {
    if src.is_empty() || dst.is_empty() || src == dst {
        return None;
    }
    if is_reserved(src) || is_reserved(dst) {
        return None;
    }
    Some((src.to_string(), dst.to_string()))
}

/// Infer a (src, dst) pair from a raw syslog message body.
pub fn infer_pair(msg: &str) -> Option<(String, String)> {
    if let Some((src, dst)) = extract_cef(msg) {
        if let Some(pair) = validate_pair(&src, &dst) {
            return Some(pair);
        }
    }

    if let Some((src, dst)) = extract_cisco(msg) {
        if let Some(pair) = validate_pair(&src, &dst) {
            return Some(pair);
        }
    }

    // Fallback: first valid pair among all extracted addresses.
    let ips = extract_ips(msg);
    for i in 0..ips.len() {
        for j in (i + 1)..ips.len() {
            if let Some(pair) = validate_pair(&ips[i], &ips[j]) {
                return Some(pair);
            }
        }
    }

    None
}
