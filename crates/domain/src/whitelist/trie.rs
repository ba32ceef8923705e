use std::net::IpAddr;

use ipnet::IpNet;

/// Binary trie node. One node per prefix bit; `terminal` marks the end of
/// an inserted prefix, so membership is a walk that stops at the first
/// terminal ancestor (longest-prefix semantics are free: any covering
/// prefix answers the query).
#[derive(Debug, Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    terminal: bool,
}

impl Node {
    fn insert(&mut self, bits: u128, prefix_len: u8, total_bits: u8) {
        let mut node = self;
        for i in 0..prefix_len {
            if node.terminal {
                // Already covered by a shorter prefix.
                return;
            }
            let bit = ((bits >> (total_bits - 1 - i)) & 1) as usize;
            node = node.children[bit]
                .get_or_insert_with(Box::default)
                .as_mut();
        }
        node.terminal = true;
        // Anything below this prefix is now shadowed.
        node.children = [None, None];
    }

    fn contains(&self, bits: u128, total_bits: u8) -> bool {
        let mut node = self;
        for i in 0..total_bits {
            if node.terminal {
                return true;
            }
            let bit = ((bits >> (total_bits - 1 - i)) & 1) as usize;
            match node.children[bit].as_deref() {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.terminal
    }
}

/// CIDR membership trie over IPv4 and IPv6 prefixes.
///
/// Immutable once built; concurrent readers share it behind an `Arc`, and
/// a whitelist refresh builds a fresh trie and swaps the `Arc` so readers
/// never observe a torn snapshot.
#[derive(Debug, Default)]
pub struct PrefixTrie {
    v4: Node,
    v6: Node,
    len: usize,
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trie from already-parsed CIDR prefixes.
    pub fn from_cidrs<I>(cidrs: I) -> Self
    where
        I: IntoIterator<Item = IpNet>,
    {
        let mut trie = Self::new();
        for net in cidrs {
            trie.insert(net);
        }
        trie
    }

    pub fn insert(&mut self, net: IpNet) {
        match net {
            IpNet::V4(n) => {
                let bits = u128::from(u32::from(n.network()));
                self.v4.insert(bits, n.prefix_len(), 32);
            }
            IpNet::V6(n) => {
                let bits = u128::from(n.network());
                self.v6.insert(bits, n.prefix_len(), 128);
            }
        }
        self.len += 1;
    }

    /// True when `ip` falls inside any inserted prefix.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self.v4.contains(u128::from(u32::from(v4)), 32),
            IpAddr::V6(v6) => self.v6.contains(u128::from(v6), 128),
        }
    }

    /// True when `ip` parses and falls inside any inserted prefix.
    /// An unparseable string is simply not whitelisted.
    pub fn contains_str(&self, ip: &str) -> bool {
        match ip.parse::<IpAddr>() {
            Ok(addr) => self.contains(addr),
            Err(_) => false,
        }
    }

    /// Number of prefixes inserted.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(cidrs: &[&str]) -> PrefixTrie {
        PrefixTrie::from_cidrs(cidrs.iter().map(|c| c.parse::<IpNet>().unwrap()))
    }

    #[test]
    fn empty_trie_contains_nothing() {
        let t = PrefixTrie::new();
        assert!(!t.contains_str("10.0.0.1"));
        assert!(!t.contains_str("::1"));
        assert!(t.is_empty());
    }

    #[test]
    fn ipv4_prefix_membership() {
        let t = trie(&["10.0.0.0/8"]);
        assert!(t.contains_str("10.0.0.5"));
        assert!(t.contains_str("10.255.255.255"));
        assert!(!t.contains_str("11.0.0.1"));
        assert!(!t.contains_str("9.255.255.255"));
    }

    #[test]
    fn ipv4_host_route() {
        let t = trie(&["192.0.2.7/32"]);
        assert!(t.contains_str("192.0.2.7"));
        assert!(!t.contains_str("192.0.2.8"));
    }

    #[test]
    fn ipv6_prefix_membership() {
        let t = trie(&["2001:db8::/32"]);
        assert!(t.contains_str("2001:db8::1"));
        assert!(t.contains_str("2001:db8:ffff::42"));
        assert!(!t.contains_str("2001:db9::1"));
    }

    #[test]
    fn mixed_families_do_not_cross_match() {
        let t = trie(&["10.0.0.0/8", "fc00::/7"]);
        assert!(t.contains_str("10.1.2.3"));
        assert!(t.contains_str("fd12::1"));
        assert!(!t.contains_str("fe80::1"));
        assert!(!t.contains_str("172.16.0.1"));
    }

    #[test]
    fn nested_prefixes_still_match() {
        let t = trie(&["10.0.0.0/8", "10.20.0.0/16"]);
        assert!(t.contains_str("10.20.30.40"));
        assert!(t.contains_str("10.99.0.1"));
    }

    #[test]
    fn shorter_prefix_inserted_second_shadows_longer() {
        let t = trie(&["10.20.0.0/16", "10.0.0.0/8"]);
        assert!(t.contains_str("10.20.1.1"));
        assert!(t.contains_str("10.200.1.1"));
    }

    #[test]
    fn zero_length_prefix_matches_everything_in_family() {
        let t = trie(&["0.0.0.0/0"]);
        assert!(t.contains_str("8.8.8.8"));
        assert!(t.contains_str("255.255.255.255"));
        assert!(!t.contains_str("::1"));
    }

    #[test]
    fn invalid_ip_string_is_not_whitelisted() {
        let t = trie(&["10.0.0.0/8"]);
        assert!(!t.contains_str("not-an-ip"));
        assert!(!t.contains_str(""));
        assert!(!t.contains_str("10.0.0"));
    }

    #[test]
    fn len_counts_inserted_prefixes() {
        let t = trie(&["10.0.0.0/8", "192.168.0.0/16", "2001:db8::/32"]);
        assert_eq!(t.len(), 3);
    }
}
