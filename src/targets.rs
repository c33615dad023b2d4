use crate::error::{ParseError, ParseResult};
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Largest block or range we are willing to expand in memory.
pub const MAX_ADDRESSES: u128 = 1 << 24;

/// Expand one target specification into an ordered list of addresses.
///
/// Accepted forms:
/// - CIDR: `192.168.1.0/24` (network and broadcast excluded when the block
///   holds more than two addresses)
/// - inclusive range: `10.0.0.254-10.0.1.1`
/// - literal address: `10.0.0.7`
pub fn parse_target(spec: &str) -> ParseResult<Vec<IpAddr>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ParseError::InvalidTarget("empty target".into()));
    }

    if spec.contains('/') {
        let net: IpNet = spec
            .parse()
            .map_err(|e| ParseError::InvalidTarget(format!("{spec}: {e}")))?;
        return expand_cidr(net);
    }

    if let Some((a, b)) = spec.split_once('-') {
        return parse_range(spec, a.trim(), b.trim());
    }

    spec.parse::<IpAddr>()
        .map(|ip| vec![ip])
        .map_err(|_| ParseError::InvalidTarget(spec.to_string()))
}

/// Expand several specifications, concatenated in order, first occurrence wins.
pub fn parse_targets<S: AsRef<str>>(specs: &[S]) -> ParseResult<Vec<IpAddr>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for spec in specs {
        for ip in parse_target(spec.as_ref())? {
            if seen.insert(ip) {
                out.push(ip);
            }
        }
    }
    if out.is_empty() {
        return Err(ParseError::InvalidTarget("no targets given".into()));
    }
    Ok(out)
}

/// Expand a CIDR block into host addresses.
///
/// Blocks with at least two host bits (IPv4 /30 and wider, IPv6 /126 and
/// wider) skip the first and last address. /31, /32, /127 and /128 keep all.
pub fn expand_cidr(net: IpNet) -> ParseResult<Vec<IpAddr>> {
    let net = net.trunc();
    let host_bits = net.max_prefix_len() - net.prefix_len();
    if u32::from(host_bits) > MAX_ADDRESSES.trailing_zeros() {
        return Err(ParseError::InvalidTarget(format!(
            "{net}: block larger than {MAX_ADDRESSES} addresses"
        )));
    }

    let (mut first, mut last) = (net.network(), net.broadcast());
    if host_bits >= 2 {
        // Both are in range: the block holds at least four addresses.
        first = next_addr(first).unwrap_or(first);
        last = prev_addr(last).unwrap_or(last);
    }
    Ok(span(first, last))
}

fn parse_range(spec: &str, a: &str, b: &str) -> ParseResult<Vec<IpAddr>> {
    let invalid = |reason: &str| ParseError::InvalidRange(format!("{spec}: {reason}"));

    let start: IpAddr = a.parse().map_err(|_| invalid("bad start address"))?;
    let end: IpAddr = b.parse().map_err(|_| invalid("bad end address"))?;
    if start.is_ipv4() != end.is_ipv4() {
        return Err(invalid("mixed address families"));
    }
    if start > end {
        return Err(invalid("start is greater than end"));
    }
    if addr_bits(end) - addr_bits(start) >= MAX_ADDRESSES {
        return Err(invalid("range too large"));
    }
    Ok(span(start, end))
}

/// Every address from `start` to `end` inclusive. Both must share a family.
fn span(start: IpAddr, end: IpAddr) -> Vec<IpAddr> {
    let len = (addr_bits(end) - addr_bits(start) + 1) as usize;
    let mut out = Vec::with_capacity(len);
    let mut cur = start;
    loop {
        out.push(cur);
        if cur == end {
            break;
        }
        match next_addr(cur) {
            Some(next) => cur = next,
            None => break,
        }
    }
    out
}

/// The address that follows `ip`, or `None` at the top of the address space.
///
/// Carries propagate across the whole address since the increment runs on
/// the integer form.
pub fn next_addr(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(v4) => u32::from(v4)
            .checked_add(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpAddr::V6(v6) => u128::from(v6)
            .checked_add(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}

fn prev_addr(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(v4) => u32::from(v4)
            .checked_sub(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpAddr::V6(v6) => u128::from(v6)
            .checked_sub(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}

fn addr_bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Detect local non-loopback IPv4 interfaces and turn each into its /24.
///
/// For example, an interface address `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed and the result is sorted.
pub fn detect_local_cidrs() -> std::io::Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            if let Some(net) = local_cidr(v4.ip) {
                set.insert(net);
            }
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// The /24 network containing `ip`.
pub fn local_cidr(ip: Ipv4Addr) -> Option<Ipv4Net> {
    Ipv4Net::new(ip, 24).ok().map(|n| n.trunc())
}
