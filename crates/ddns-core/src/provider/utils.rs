//! Building hostnames and reading IP addresses out of provider responses.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Fully qualified name of a record.
///
/// `@` is the apex itself, `*` is looked up as `any.<domain>` since a
/// wildcard cannot be resolved directly.
pub fn build_domain_name(owner: &str, domain: &str) -> String {
    match owner {
        "@" | "" => domain.to_string(),
        "*" => format!("any.{domain}"),
        _ => format!("{owner}.{domain}"),
    }
}

/// Hostname as sent in update query strings, keeping `*` verbatim.
pub fn build_url_query_hostname(owner: &str, domain: &str) -> String {
    match owner {
        "@" | "" => domain.to_string(),
        _ => format!("{owner}.{domain}"),
    }
}

/// All valid IPv4 addresses found in `text`, in order of appearance.
pub fn find_ipv4_addresses(text: &str) -> Vec<Ipv4Addr> {
    candidates(text, |c| c.is_ascii_digit() || c == '.')
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// All valid IPv6 addresses found in `text`, in order of appearance.
pub fn find_ipv6_addresses(text: &str) -> Vec<Ipv6Addr> {
    candidates(text, |c| c.is_ascii_hexdigit() || c == ':' || c == '.')
        .filter(|token| token.contains(':'))
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Maximal runs of characters accepted by `keep`.
fn candidates(text: &str, keep: impl Fn(char) -> bool) -> impl Iterator<Item = &str> {
    text.split(move |c: char| !keep(c))
        .map(|token| token.trim_matches('.'))
        .filter(|token| !token.is_empty())
}

/// First IP address of the requested family found in `text`.
pub fn find_ip(text: &str, ipv6: bool) -> Option<IpAddr> {
    if ipv6 {
        find_ipv6_addresses(text).into_iter().next().map(IpAddr::V6)
    } else {
        find_ipv4_addresses(text).into_iter().next().map(IpAddr::V4)
    }
}

/// Collapse a response body onto one line for error messages.
pub fn to_single_line(body: &str) -> String {
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Query parameter name and value for an update, picked by IP family.
pub fn ip_query_param(ip: IpAddr, ipv4_key: &str, ipv6_key: &str) -> (String, String) {
    match ip {
        IpAddr::V4(_) => (ipv4_key.to_string(), ip.to_string()),
        IpAddr::V6(_) => (ipv6_key.to_string(), ip.to_string()),
    }
}
