use std::net::IpAddr;

use ipnet::IpNet;

/// Parse a trusted-IP entry: either a bare address (`127.0.0.1`, `::1`) or a
/// CIDR range (`10.0.0.0/8`, `2a12:105:ee7:9234::/64`). Bare addresses become
/// full-length prefixes.
pub fn parse_ip_net(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    if let Ok(addr) = s.parse::<IpAddr>() {
        return Some(IpNet::from(addr));
    }
    None
}

/// A set of IP networks (v4 + v6) with O(prefix-length) membership.
///
/// Networks are stored in a binary prefix trie per address family, so a
/// lookup walks at most 32 (v4) or 128 (v6) bits regardless of how many
/// ranges have been added.
#[derive(Debug, Clone, Default)]
pub struct NetSet {
    v4: PrefixTrie,
    v6: PrefixTrie,
    nets: Vec<IpNet>,
}

impl NetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a network to the set. Host bits beyond the prefix are ignored.
    pub fn add(&mut self, net: IpNet) {
        let net = net.trunc();
        match net {
            IpNet::V4(n) => {
                let bits = (u32::from(n.addr()) as u128) << 96;
                self.v4.insert(bits, n.prefix_len());
            }
            IpNet::V6(n) => {
                let bits = u128::from(n.addr());
                self.v6.insert(bits, n.prefix_len());
            }
        }
        self.nets.push(net);
    }

    /// Membership test: true iff `addr` falls within any added network.
    pub fn has(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.v4.contains((u32::from(v4) as u128) << 96, 32),
            IpAddr::V6(v6) => self.v6.contains(u128::from(v6), 128),
        }
    }

    /// The networks added so far, in insertion order.
    pub fn nets(&self) -> &[IpNet] {
        &self.nets
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }
}

/// Binary trie over address bits, most significant bit first. A terminal
/// node marks the end of an inserted prefix; any address whose walk passes
/// through a terminal node is a member.
#[derive(Debug, Clone, Default)]
struct PrefixTrie {
    root: Node,
}

#[derive(Debug, Clone, Default)]
struct Node {
    terminal: bool,
    children: [Option<Box<Node>>; 2],
}

impl PrefixTrie {
    /// `bits` are left-aligned in the u128; only the first `prefix_len` are
    /// significant.
    fn insert(&mut self, bits: u128, prefix_len: u8) {
        let mut node = &mut self.root;
        for i in 0..prefix_len {
            if node.terminal {
                // Already covered by a shorter prefix.
                return;
            }
            let bit = ((bits >> (127 - i)) & 1) as usize;
            node = &mut **node.children[bit].get_or_insert_with(Box::default);
        }
        node.terminal = true;
        // A terminal node covers everything below it.
        node.children = [None, None];
    }

    fn contains(&self, bits: u128, total_bits: u8) -> bool {
        let mut node = &self.root;
        for i in 0..total_bits {
            if node.terminal {
                return true;
            }
            let bit = ((bits >> (127 - i)) & 1) as usize;
            match &node.children[bit] {
                Some(child) => node = &**child,
                None => return false,
            }
        }
        node.terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn netset(entries: &[&str]) -> NetSet {
        let mut set = NetSet::new();
        for entry in entries {
            set.add(parse_ip_net(entry).expect(entry));
        }
        set
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_bare_addresses_and_cidrs() {
        assert_eq!(parse_ip_net("127.0.0.1").unwrap().prefix_len(), 32);
        assert_eq!(parse_ip_net("::1").unwrap().prefix_len(), 128);
        assert_eq!(parse_ip_net("10.32.0.1/32").unwrap().prefix_len(), 32);
        assert_eq!(
            parse_ip_net("2a12:105:ee7:9234:0:0:0:0/64").unwrap().prefix_len(),
            64
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_ip_net("[::1]").is_none());
        assert!(parse_ip_net("alkwlkbn/32").is_none());
        assert!(parse_ip_net("10.0.0.0/33").is_none());
        assert!(parse_ip_net("").is_none());
    }

    #[test]
    fn test_membership_within_added_ranges() {
        let set = netset(&[
            "127.0.0.1",
            "10.32.0.1/32",
            "43.36.201.0/24",
            "::1",
            "2a12:105:ee7:9234:0:0:0:0/64",
        ]);

        assert!(set.has(addr("127.0.0.1")));
        assert!(set.has(addr("10.32.0.1")));
        assert!(set.has(addr("43.36.201.100")));
        assert!(set.has(addr("::1")));
        assert!(set.has(addr("2a12:105:ee7:9234::beef")));
    }

    #[test]
    fn test_no_membership_outside_added_ranges() {
        let set = netset(&["127.0.0.1", "10.32.0.1/32", "43.36.201.0/24"]);

        assert!(!set.has(addr("10.32.0.2")));
        assert!(!set.has(addr("43.36.202.1")));
        assert!(!set.has(addr("192.0.2.1")));
        assert!(!set.has(addr("::1")));
    }

    #[test]
    fn test_overlapping_ranges_are_harmless() {
        let set = netset(&[
            "135.180.78.199",
            "135.180.78.199/32",
            "d910:a5a1:16f8:ddf5:e5b9:5cef:a65e:41f4",
            "d910:a5a1:16f8:ddf5:e5b9:5cef:a65e:41f4/128",
        ]);

        assert!(set.has(addr("135.180.78.199")));
        assert!(set.has(addr("d910:a5a1:16f8:ddf5:e5b9:5cef:a65e:41f4")));
        assert!(!set.has(addr("135.180.78.198")));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_shorter_prefix_subsumes_longer() {
        let set = netset(&["10.0.0.0/8", "10.1.2.0/24"]);
        assert!(set.has(addr("10.1.2.3")));
        assert!(set.has(addr("10.200.0.1")));
        assert!(!set.has(addr("11.0.0.1")));
    }

    #[test]
    fn test_host_bits_are_masked() {
        let set = netset(&["10.1.2.3/8"]);
        assert!(set.has(addr("10.255.255.255")));
    }

    #[test]
    fn test_families_do_not_bleed() {
        let set = netset(&["0.0.0.0/0"]);
        assert!(set.has(addr("203.0.113.7")));
        assert!(!set.has(addr("2001:db8::1")));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = NetSet::new();
        assert!(set.is_empty());
        assert!(!set.has(addr("127.0.0.1")));
        assert!(!set.has(addr("::1")));
    }
}
