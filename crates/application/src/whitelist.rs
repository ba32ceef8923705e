use std::sync::{Arc, RwLock};

use ipnet::IpNet;

use domain::whitelist::trie::PrefixTrie;

/// Atomically swappable whitelist snapshot.
///
/// Readers clone an `Arc` to the current trie; `replace` builds a fresh
/// trie from the incoming CIDR list and swaps it under the writer lock,
/// so a membership check never observes a half-built snapshot.
pub struct WhitelistService {
    current: RwLock<Arc<PrefixTrie>>,
}

impl WhitelistService {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PrefixTrie::new())),
        }
    }

    /// True when the IP text parses and matches a whitelisted prefix.
    pub fn contains(&self, ip: &str) -> bool {
        let snapshot = Arc::clone(&self.current.read().expect("whitelist lock poisoned"));
        snapshot.contains_str(ip)
    }

    /// Rebuild the trie from CIDR strings. Invalid entries are logged and
    /// skipped; the remainder still takes effect. Returns the number of
    /// prefixes loaded.
    pub fn replace(&self, cidrs: &[String]) -> usize {
        let mut trie = PrefixTrie::new();
        for cidr in cidrs {
            match cidr.parse::<IpNet>() {
                Ok(net) => trie.insert(net),
                Err(e) => {
                    tracing::warn!(cidr = %cidr, error = %e, "invalid whitelist CIDR, skipping");
                }
            }
        }
        let loaded = trie.len();
        *self.current.write().expect("whitelist lock poisoned") = Arc::new(trie);
        loaded
    }
}

impl Default for WhitelistService {
    fn default() -> Self {
        Self::new()
    }
}
