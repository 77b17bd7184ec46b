//! Static IP range tables and address classification.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;

/// Category of an IP address as far as outbound fetching is concerned.
///
/// Only [`AddressClass::Public`] is fetchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressClass {
    Public,
    Private,
    Loopback,
    LinkLocal,
    Multicast,
    Reserved,
}

impl AddressClass {
    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Loopback => "loopback",
            Self::LinkLocal => "link-local",
            Self::Multicast => "multicast",
            Self::Reserved => "reserved",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of an address plus the range that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub class: AddressClass,
    /// CIDR text of the matching table entry, empty for public addresses.
    pub range: &'static str,
}

impl Classification {
    const fn new(class: AddressClass, range: &'static str) -> Self {
        Self { class, range }
    }

    const PUBLIC: Self = Self::new(AddressClass::Public, "");
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.is_empty() {
            write!(f, "{} address", self.class)
        } else {
            write!(f, "{} address ({})", self.class, self.range)
        }
    }
}

struct Range<T> {
    net: T,
    prefix: u32,
    class: AddressClass,
    label: &'static str,
}

const fn v4(net: [u8; 4], prefix: u32, class: AddressClass, label: &'static str) -> Range<u32> {
    Range {
        net: u32::from_be_bytes(net),
        prefix,
        class,
        label,
    }
}

const fn v6(net: u128, prefix: u32, class: AddressClass, label: &'static str) -> Range<u128> {
    Range {
        net,
        prefix,
        class,
        label,
    }
}

use AddressClass::{LinkLocal, Loopback, Multicast, Private, Reserved};

const IPV4_RANGES: &[Range<u32>] = &[
    v4([0, 0, 0, 0], 8, Reserved, "0.0.0.0/8"),
    v4([10, 0, 0, 0], 8, Private, "10.0.0.0/8"),
    // Shared address space (RFC 6598); also holds the Alibaba metadata endpoint.
    v4([100, 64, 0, 0], 10, Private, "100.64.0.0/10"),
    v4([127, 0, 0, 0], 8, Loopback, "127.0.0.0/8"),
    v4([169, 254, 0, 0], 16, LinkLocal, "169.254.0.0/16"),
    v4([172, 16, 0, 0], 12, Private, "172.16.0.0/12"),
    v4([192, 0, 0, 0], 24, Reserved, "192.0.0.0/24"),
    v4([192, 0, 2, 0], 24, Reserved, "192.0.2.0/24"),
    v4([192, 88, 99, 0], 24, Reserved, "192.88.99.0/24"),
    v4([192, 168, 0, 0], 16, Private, "192.168.0.0/16"),
    v4([198, 18, 0, 0], 15, Reserved, "198.18.0.0/15"),
    v4([198, 51, 100, 0], 24, Reserved, "198.51.100.0/24"),
    v4([203, 0, 113, 0], 24, Reserved, "203.0.113.0/24"),
    v4([224, 0, 0, 0], 4, Multicast, "224.0.0.0/4"),
    v4([240, 0, 0, 0], 4, Reserved, "240.0.0.0/4"),
];

const IPV6_RANGES: &[Range<u128>] = &[
    v6(0x0064_ff9b_0001_0000_0000_0000_0000_0000, 48, Private, "64:ff9b:1::/48"),
    v6(0x0100_0000_0000_0000_0000_0000_0000_0000, 64, Reserved, "100::/64"),
    v6(0x2001_0db8_0000_0000_0000_0000_0000_0000, 32, Reserved, "2001:db8::/32"),
    v6(0x2001_0000_0000_0000_0000_0000_0000_0000, 23, Reserved, "2001::/23"),
    v6(0xfc00_0000_0000_0000_0000_0000_0000_0000, 7, Private, "fc00::/7"),
    v6(0xfe80_0000_0000_0000_0000_0000_0000_0000, 10, LinkLocal, "fe80::/10"),
    v6(0xfec0_0000_0000_0000_0000_0000_0000_0000, 10, Reserved, "fec0::/10"),
    v6(0xff00_0000_0000_0000_0000_0000_0000_0000, 8, Multicast, "ff00::/8"),
];

const NAT64_PREFIX: u128 = 0x0064_ff9b_0000_0000_0000_0000_0000_0000;
const SIX_TO_FOUR_PREFIX: u128 = 0x2002_0000_0000_0000_0000_0000_0000_0000;
const GLOBAL_UNICAST: u128 = 0x2000_0000_0000_0000_0000_0000_0000_0000;

fn in_v4(net: u32, prefix: u32, ip: u32) -> bool {
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    ip & mask == net
}

fn in_v6(net: u128, prefix: u32, ip: u128) -> bool {
    let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
    ip & mask == net
}

/// Classify an address.
pub fn classify(ip: IpAddr) -> AddressClass {
    describe(ip).class
}

/// Classify an address and report the range responsible.
pub fn describe(ip: IpAddr) -> Classification {
    match ip {
        IpAddr::V4(v4) => describe_v4(v4),
        IpAddr::V6(v6) => describe_v6(v6),
    }
}

fn describe_v4(ip: Ipv4Addr) -> Classification {
    let bits = u32::from(ip);
    IPV4_RANGES
        .iter()
        .find(|r| in_v4(r.net, r.prefix, bits))
        .map(|r| Classification::new(r.class, r.label))
        .unwrap_or(Classification::PUBLIC)
}

fn describe_v6(ip: Ipv6Addr) -> Classification {
    let bits = u128::from(ip);

    if bits == 0 {
        return Classification::new(Reserved, "::/128");
    }
    // Loopback before any IPv4 embedding checks.
    if bits == 1 {
        return Classification::new(Loopback, "::1/128");
    }

    // Forms that carry an IPv4 address are judged by that address.
    if let Some(v4) = ip.to_ipv4_mapped() {
        return describe_v4(v4);
    }
    if in_v6(NAT64_PREFIX, 96, bits) {
        return describe_v4(Ipv4Addr::from(bits as u32));
    }
    if in_v6(SIX_TO_FOUR_PREFIX, 16, bits) {
        return describe_v4(Ipv4Addr::from((bits >> 80) as u32));
    }
    // Deprecated IPv4-compatible form (::a.b.c.d).
    if bits >> 32 == 0 {
        return Classification::new(Reserved, "::/96");
    }

    if let Some(r) = IPV6_RANGES.iter().find(|r| in_v6(r.net, r.prefix, bits)) {
        return Classification::new(r.class, r.label);
    }

    if in_v6(GLOBAL_UNICAST, 3, bits) {
        Classification::PUBLIC
    } else {
        Classification::new(Reserved, "outside 2000::/3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(s: &str) -> AddressClass {
        classify(s.parse().unwrap())
    }

    #[test]
    fn test_public_ipv4() {
        assert_eq!(class("93.184.216.34"), AddressClass::Public);
        assert_eq!(class("8.8.8.8"), AddressClass::Public);
        assert_eq!(class("1.1.1.1"), AddressClass::Public);
    }

    #[test]
    fn test_loopback_full_range() {
        assert_eq!(class("127.0.0.0"), AddressClass::Loopback);
        assert_eq!(class("127.0.0.1"), AddressClass::Loopback);
        assert_eq!(class("127.1.2.3"), AddressClass::Loopback);
        assert_eq!(class("127.255.255.255"), AddressClass::Loopback);
        assert_eq!(class("::1"), AddressClass::Loopback);
        assert_eq!(class("0:0:0:0:0:0:0:1"), AddressClass::Loopback);
    }

    #[test]
    fn test_rfc1918_boundaries() {
        assert_eq!(class("10.0.0.0"), AddressClass::Private);
        assert_eq!(class("10.255.255.255"), AddressClass::Private);
        assert_eq!(class("9.255.255.255"), AddressClass::Public);
        assert_eq!(class("11.0.0.0"), AddressClass::Public);

        assert_eq!(class("172.16.0.0"), AddressClass::Private);
        assert_eq!(class("172.31.255.255"), AddressClass::Private);
        assert_eq!(class("172.15.255.255"), AddressClass::Public);
        assert_eq!(class("172.32.0.0"), AddressClass::Public);

        assert_eq!(class("192.168.0.0"), AddressClass::Private);
        assert_eq!(class("192.168.255.255"), AddressClass::Private);
        assert_eq!(class("192.167.255.255"), AddressClass::Public);
        assert_eq!(class("192.169.0.0"), AddressClass::Public);
    }

    #[test]
    fn test_link_local_and_metadata() {
        assert_eq!(class("169.254.169.254"), AddressClass::LinkLocal);
        assert_eq!(class("169.254.1.1"), AddressClass::LinkLocal);
        assert_eq!(class("fe80::1"), AddressClass::LinkLocal);
        assert_eq!(class("fe80::ffff:ffff:ffff:ffff"), AddressClass::LinkLocal);
        // Alibaba metadata sits in shared address space.
        assert_eq!(class("100.100.100.200"), AddressClass::Private);
        // AWS IPv6 metadata sits in unique-local space.
        assert_eq!(class("fd00:ec2::254"), AddressClass::Private);
    }

    #[test]
    fn test_multicast() {
        assert_eq!(class("224.0.0.1"), AddressClass::Multicast);
        assert_eq!(class("239.255.255.255"), AddressClass::Multicast);
        assert_eq!(class("ff02::1"), AddressClass::Multicast);
    }

    #[test]
    fn test_reserved_and_documentation() {
        assert_eq!(class("0.0.0.0"), AddressClass::Reserved);
        assert_eq!(class("192.0.2.10"), AddressClass::Reserved);
        assert_eq!(class("198.18.0.1"), AddressClass::Reserved);
        assert_eq!(class("198.19.255.255"), AddressClass::Reserved);
        assert_eq!(class("198.51.100.7"), AddressClass::Reserved);
        assert_eq!(class("203.0.113.9"), AddressClass::Reserved);
        assert_eq!(class("240.0.0.1"), AddressClass::Reserved);
        assert_eq!(class("255.255.255.255"), AddressClass::Reserved);
        assert_eq!(class("::"), AddressClass::Reserved);
        assert_eq!(class("2001:db8::1"), AddressClass::Reserved);
        assert_eq!(class("100::1"), AddressClass::Reserved);
        assert_eq!(class("fec0::1"), AddressClass::Reserved);
    }

    #[test]
    fn test_ipv6_unique_local() {
        assert_eq!(class("fc00::1"), AddressClass::Private);
        assert_eq!(class("fd12:3456:789a::1"), AddressClass::Private);
        assert_eq!(
            class("fdff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"),
            AddressClass::Private
        );
    }

    #[test]
    fn test_ipv4_mapped_uses_embedded_address() {
        assert_eq!(class("::ffff:127.0.0.1"), AddressClass::Loopback);
        assert_eq!(class("::ffff:7f00:1"), AddressClass::Loopback);
        assert_eq!(class("::ffff:10.0.0.1"), AddressClass::Private);
        assert_eq!(class("::ffff:169.254.169.254"), AddressClass::LinkLocal);
        assert_eq!(class("::ffff:93.184.216.34"), AddressClass::Public);
    }

    #[test]
    fn test_nat64_and_6to4_use_embedded_address() {
        assert_eq!(class("64:ff9b::127.0.0.1"), AddressClass::Loopback);
        assert_eq!(class("64:ff9b::8.8.8.8"), AddressClass::Public);
        // 2002:7f00:0001:: embeds 127.0.0.1
        assert_eq!(class("2002:7f00:1::"), AddressClass::Loopback);
        assert_eq!(class("2002:c0a8:101::1"), AddressClass::Private);
    }

    #[test]
    fn test_ipv4_compatible_never_public() {
        assert_eq!(class("::127.0.0.1"), AddressClass::Reserved);
        assert_eq!(class("::8.8.8.8"), AddressClass::Reserved);
    }

    #[test]
    fn test_public_ipv6() {
        assert_eq!(class("2001:4860:4860::8888"), AddressClass::Public);
        assert_eq!(class("2606:2800:220:1:248:1893:25c8:1946"), AddressClass::Public);
    }

    #[test]
    fn test_outside_global_unicast_is_reserved() {
        assert_eq!(class("4000::1"), AddressClass::Reserved);
        assert_eq!(class("1::1"), AddressClass::Reserved);
    }

    #[test]
    fn test_describe_names_range() {
        let c = describe("10.1.2.3".parse().unwrap());
        assert_eq!(c.class, AddressClass::Private);
        assert_eq!(c.range, "10.0.0.0/8");
        assert_eq!(c.to_string(), "private address (10.0.0.0/8)");
        assert_eq!(describe("8.8.8.8".parse().unwrap()).to_string(), "public address");
    }
}
