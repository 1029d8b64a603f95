//! Address classification: is an IP globally routable, and if not, why.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Why an address (or hostname) was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockReason {
    Loopback,
    LinkLocal,
    Private,
    Multicast,
    Reserved,
    Unspecified,
    CloudMetadata,
    /// Denied by an operator rule in [`Policy`](crate::Policy).
    PolicyDenied,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::LinkLocal => "link-local",
            Self::Private => "private",
            Self::Multicast => "multicast",
            Self::Reserved => "reserved",
            Self::Unspecified => "unspecified",
            Self::CloudMetadata => "cloud-metadata",
            Self::PolicyDenied => "policy-denied",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Routable,
    Blocked(BlockReason),
}

impl Classification {
    pub fn is_routable(self) -> bool {
        matches!(self, Self::Routable)
    }

    pub fn block_reason(self) -> Option<BlockReason> {
        match self {
            Self::Routable => None,
            Self::Blocked(reason) => Some(reason),
        }
    }
}

/// Hostnames that are internal by definition (checked before DNS resolution).
const BLOCKED_HOSTNAMES: &[(&str, BlockReason)] = &[
    ("localhost", BlockReason::Loopback),
    ("metadata.google.internal", BlockReason::CloudMetadata),
    ("metadata.goog", BlockReason::CloudMetadata),
    ("metadata.azure.internal", BlockReason::CloudMetadata),
    ("instance-data", BlockReason::CloudMetadata),
];

/// Check a hostname against the built-in blocklist. Subdomains match too.
pub fn classify_hostname(host: &str) -> Option<BlockReason> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    BLOCKED_HOSTNAMES.iter().find_map(|&(blocked, reason)| {
        let subdomain = host
            .strip_suffix(blocked)
            .is_some_and(|prefix| prefix.ends_with('.'));
        (host == blocked || subdomain).then_some(reason)
    })
}

/// Decide whether an address is globally routable.
///
/// Pure and deterministic. `169.254.169.254` is reported as
/// [`BlockReason::LinkLocal`] like the rest of its range; metadata endpoints
/// outside link-local space get [`BlockReason::CloudMetadata`].
pub fn classify(ip: IpAddr) -> Classification {
    let reason = match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    };
    match reason {
        Some(reason) => Classification::Blocked(reason),
        None => Classification::Routable,
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<BlockReason> {
    let [a, b, c, _] = ip.octets();

    // 0.0.0.0/8, "this network"
    if a == 0 {
        return Some(BlockReason::Unspecified);
    }
    if ip.is_loopback() {
        return Some(BlockReason::Loopback);
    }
    if ip.is_link_local() {
        return Some(BlockReason::LinkLocal);
    }
    // Alibaba Cloud
    if ip == Ipv4Addr::new(100, 100, 100, 200) {
        return Some(BlockReason::CloudMetadata);
    }
    if ip.is_private() {
        return Some(BlockReason::Private);
    }
    if ip.is_multicast() {
        return Some(BlockReason::Multicast);
    }

    let reserved =
        // 100.64.0.0/10 shared address space (CGNAT)
        (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 IETF protocol assignments
        || (a == 192 && b == 0 && c == 0)
        // documentation
        || (a == 192 && b == 0 && c == 2)
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 and broadcast
        || a >= 240;

    reserved.then_some(BlockReason::Reserved)
}

fn classify_v6(ip: Ipv6Addr) -> Option<BlockReason> {
    if ip.is_unspecified() {
        return Some(BlockReason::Unspecified);
    }
    // ::1 before any embedded-IPv4 handling
    if ip.is_loopback() {
        return Some(BlockReason::Loopback);
    }
    if let Some(v4) = embedded_ipv4(ip) {
        return classify_v4(v4);
    }

    let seg = ip.segments();

    // fe80::/10
    if (seg[0] & 0xffc0) == 0xfe80 {
        return Some(BlockReason::LinkLocal);
    }
    // AWS IPv6 metadata, inside fc00::/7 so it must come first
    if ip == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254) {
        return Some(BlockReason::CloudMetadata);
    }
    // fc00::/7
    if (seg[0] & 0xfe00) == 0xfc00 {
        return Some(BlockReason::Private);
    }
    if ip.is_multicast() {
        return Some(BlockReason::Multicast);
    }

    let reserved =
        // 2001:db8::/32 documentation
        (seg[0] == 0x2001 && seg[1] == 0x0db8)
        // 2001::/23 IETF protocol assignments (Teredo, ORCHID, ...)
        || (seg[0] == 0x2001 && seg[1] < 0x0200)
        // 100::/64 discard-only
        || (seg[0] == 0x0100 && seg[1] == 0 && seg[2] == 0 && seg[3] == 0)
        // 3fff::/20 documentation
        || (seg[0] == 0x3fff && seg[1] < 0x1000)
        // 64:ff9b:1::/48 local-use NAT64, when not in the /96 form decoded above
        || (seg[0] == 0x0064 && seg[1] == 0xff9b && seg[2] == 0x0001)
        // fec0::/10 deprecated site-local
        || (seg[0] & 0xffc0) == 0xfec0;

    reserved.then_some(BlockReason::Reserved)
}

/// Well-known instance metadata endpoints, in any encoding.
///
/// Used to keep policy allow rules from ever re-admitting them.
pub(crate) fn is_cloud_metadata(ip: IpAddr) -> bool {
    const V4: [Ipv4Addr; 2] = [
        Ipv4Addr::new(169, 254, 169, 254),
        Ipv4Addr::new(100, 100, 100, 200),
    ];
    match ip {
        IpAddr::V4(v4) => V4.contains(&v4),
        IpAddr::V6(v6) => {
            v6 == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254)
                || embedded_ipv4(v6).is_some_and(|v4| V4.contains(&v4))
        }
    }
}

/// Extract an IPv4 address tunnelled inside an IPv6 one.
///
/// Covers IPv4-mapped (`::ffff:a.b.c.d`), IPv4-translated (`::ffff:0:a.b.c.d`),
/// IPv4-compatible (`::a.b.c.d`), NAT64 (`64:ff9b::a.b.c.d` and the local-use
/// `64:ff9b:1::a.b.c.d`) and 6to4 (`2002:aabb:ccdd::`).
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }

    let seg = ip.segments();
    let low = |hi: u16, lo: u16| {
        Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
    };

    if seg[0..6] == [0, 0, 0, 0, 0, 0] {
        return Some(low(seg[6], seg[7]));
    }
    if seg[0..6] == [0, 0, 0, 0, 0xffff, 0] {
        return Some(low(seg[6], seg[7]));
    }
    if seg[0..6] == [0x0064, 0xff9b, 0, 0, 0, 0] || seg[0..6] == [0x0064, 0xff9b, 1, 0, 0, 0] {
        return Some(low(seg[6], seg[7]));
    }
    if seg[0] == 0x2002 {
        return Some(low(seg[1], seg[2]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(ip: &str) -> Option<BlockReason> {
        classify(ip.parse().unwrap()).block_reason()
    }

    fn assert_blocked(ips: &[&str], expected: BlockReason) {
        for ip in ips {
            assert_eq!(reason(ip), Some(expected), "{ip} should be {expected}");
        }
    }

    #[test]
    fn test_loopback() {
        assert_blocked(
            &["127.0.0.0", "127.0.0.1", "127.1.2.3", "127.255.255.255", "::1"],
            BlockReason::Loopback,
        );
        assert_blocked(
            &["0:0:0:0:0:0:0:1", "0000:0000:0000:0000:0000:0000:0000:0001"],
            BlockReason::Loopback,
        );
    }

    #[test]
    fn test_link_local() {
        assert_blocked(
            &["169.254.0.1", "169.254.1.1", "169.254.255.255", "fe80::1", "febf::1"],
            BlockReason::LinkLocal,
        );
        assert_blocked(
            &["fe80::ffff:ffff:ffff:ffff", "fe80:0:0:0:0:0:0:1"],
            BlockReason::LinkLocal,
        );
    }

    #[test]
    fn test_metadata_address_is_link_local_and_never_exempt() {
        assert_eq!(reason("169.254.169.254"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("169.254.169.253"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("169.254.169.255"), Some(BlockReason::LinkLocal));
    }

    #[test]
    fn test_cloud_metadata_outside_link_local() {
        assert_blocked(&["100.100.100.200", "fd00:ec2::254"], BlockReason::CloudMetadata);
    }

    #[test]
    fn test_is_cloud_metadata_any_encoding() {
        for ip in ["169.254.169.254", "100.100.100.200", "fd00:ec2::254", "::ffff:169.254.169.254"] {
            assert!(is_cloud_metadata(ip.parse().unwrap()), "{ip}");
        }
        assert!(!is_cloud_metadata("169.254.169.253".parse().unwrap()));
    }

    #[test]
    fn test_private_ranges() {
        assert_blocked(
            &[
                "10.0.0.0",
                "10.255.255.255",
                "172.16.0.0",
                "172.31.255.255",
                "192.168.0.0",
                "192.168.1.255",
                "192.168.255.255",
            ],
            BlockReason::Private,
        );
        assert_blocked(
            &["fc00::1", "fd00::1", "fd12:3456:789a::1", "fdff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"],
            BlockReason::Private,
        );
    }

    #[test]
    fn test_private_range_boundaries_are_routable() {
        for ip in [
            "9.255.255.255",
            "11.0.0.0",
            "172.15.255.255",
            "172.32.0.0",
            "192.167.255.255",
            "192.169.0.0",
        ] {
            assert_eq!(reason(ip), None, "{ip} should be routable");
        }
    }

    #[test]
    fn test_unspecified() {
        assert_blocked(&["0.0.0.0", "0.1.2.3", "::"], BlockReason::Unspecified);
    }

    #[test]
    fn test_multicast() {
        assert_blocked(
            &["224.0.0.1", "239.255.255.250", "ff02::1", "ff05::2"],
            BlockReason::Multicast,
        );
    }

    #[test]
    fn test_reserved_and_documentation() {
        assert_blocked(
            &[
                "100.64.0.1",
                "100.127.255.255",
                "192.0.0.8",
                "192.0.2.1",
                "198.51.100.7",
                "203.0.113.9",
                "198.18.0.1",
                "198.19.255.255",
                "240.0.0.1",
                "255.255.255.255",
                "2001:db8::1",
                "2001::1",
                "100::1",
                "fec0::1",
                "3fff::1",
                "3fff:fff:ffff::1",
                "64:ff9b:1:ab00::1",
            ],
            BlockReason::Reserved,
        );
        assert_eq!(reason("100.63.255.255"), None);
        assert_eq!(reason("100.128.0.0"), None);
        assert_eq!(reason("3fff:1000::1"), None);
    }

    #[test]
    fn test_ipv4_mapped_inherits_embedded_reason() {
        assert_eq!(reason("::ffff:127.0.0.1"), Some(BlockReason::Loopback));
        assert_eq!(reason("::ffff:7f00:1"), Some(BlockReason::Loopback));
        assert_eq!(reason("0:0:0:0:0:ffff:127.0.0.1"), Some(BlockReason::Loopback));
        assert_eq!(reason("::ffff:10.0.0.1"), Some(BlockReason::Private));
        assert_eq!(reason("::ffff:172.16.0.1"), Some(BlockReason::Private));
        assert_eq!(reason("::ffff:192.168.0.1"), Some(BlockReason::Private));
        assert_eq!(reason("::ffff:169.254.169.254"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("::ffff:8.8.8.8"), None);
    }

    #[test]
    fn test_other_ipv4_embeddings() {
        // IPv4-compatible, parsed by std as ::7f00:1
        assert_eq!(reason("::127.0.0.1"), Some(BlockReason::Loopback));
        assert_eq!(reason("::169.254.169.254"), Some(BlockReason::LinkLocal));
        // NAT64
        assert_eq!(reason("64:ff9b::10.0.0.1"), Some(BlockReason::Private));
        assert_eq!(reason("64:ff9b::8.8.8.8"), None);
        assert_eq!(reason("64:ff9b:1::127.0.0.1"), Some(BlockReason::Loopback));
        assert_eq!(reason("64:ff9b:1::192.168.0.1"), Some(BlockReason::Private));
        // IPv4-translated (SIIT)
        assert_eq!(reason("::ffff:0:10.0.0.1"), Some(BlockReason::Private));
        assert_eq!(reason("::ffff:0:169.254.169.254"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("::ffff:0:8.8.8.8"), None);
        // 6to4: 2002:c0a8:0101:: embeds 192.168.1.1
        assert_eq!(reason("2002:c0a8:101::1"), Some(BlockReason::Private));
        assert_eq!(reason("2002:0808:0808::1"), None);
    }

    #[test]
    fn test_public_addresses_routable() {
        for ip in [
            "1.1.1.1",
            "8.8.8.8",
            "93.184.216.34",
            "151.101.1.69",
            "172.217.0.0",
            "2001:4860:4860::8888",
            "2606:4700:4700::1111",
            "2a00:1450:4001:80b::200e",
        ] {
            assert!(classify(ip.parse().unwrap()).is_routable(), "{ip} should be routable");
        }
    }

    #[test]
    fn test_hostname_blocklist() {
        assert_eq!(classify_hostname("localhost"), Some(BlockReason::Loopback));
        assert_eq!(classify_hostname("LOCALHOST."), Some(BlockReason::Loopback));
        assert_eq!(classify_hostname("app.localhost"), Some(BlockReason::Loopback));
        assert_eq!(
            classify_hostname("METADATA.GOOGLE.INTERNAL"),
            Some(BlockReason::CloudMetadata)
        );
        assert_eq!(
            classify_hostname("deep.sub.metadata.google.internal"),
            Some(BlockReason::CloudMetadata)
        );
        assert_eq!(classify_hostname("instance-data"), Some(BlockReason::CloudMetadata));
        assert_eq!(classify_hostname("example.com"), None);
        assert_eq!(classify_hostname("notlocalhost"), None);
        assert_eq!(classify_hostname("localhost.example.com"), None);
    }
}
