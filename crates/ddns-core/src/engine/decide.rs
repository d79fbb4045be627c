//! Pure parts of the "should this record be updated?" decision.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::time::Duration;

use crate::models::{IpVersion, Record};

/// How long a record is left alone after a provider ban.
pub const BAN_PERIOD: Duration = Duration::from_secs(3600);

/// Public IP flavors a reconciliation has to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeededVersions {
    /// Mixed (IPv4 or IPv6) address
    pub ip: bool,
    /// IPv4 address
    pub ipv4: bool,
    /// IPv6 address
    pub ipv6: bool,
}

/// Which flavors at least one record needs.
pub fn needed_versions(records: &[Record]) -> NeededVersions {
    let mut needed = NeededVersions::default();
    for record in records {
        match record.provider.ip_version() {
            IpVersion::Ipv4OrIpv6 => needed.ip = true,
            IpVersion::Ipv4 => needed.ipv4 = true,
            IpVersion::Ipv6 => needed.ipv6 = true,
        }
        if needed.ip && needed.ipv4 && needed.ipv6 {
            break;
        }
    }
    needed
}

/// Public IPs fetched for one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicIps {
    /// Mixed address
    pub ip: Option<IpAddr>,
    /// IPv4 address
    pub ipv4: Option<IpAddr>,
    /// IPv6 address, already masked
    pub ipv6: Option<IpAddr>,
}

impl PublicIps {
    /// The address matching a record's IP version
    pub fn for_version(&self, version: IpVersion) -> Option<IpAddr> {
        match version {
            IpVersion::Ipv4OrIpv6 => self.ip,
            IpVersion::Ipv4 => self.ipv4,
            IpVersion::Ipv6 => self.ipv6,
        }
    }
}

/// Whether the record was banned less than [`BAN_PERIOD`] ago.
pub fn within_ban(record: &Record, now: DateTime<Utc>) -> bool {
    record
        .last_ban
        .is_some_and(|ban| elapsed(ban, now) < BAN_PERIOD)
}

/// Whether the record's last success is more recent than `cooldown`.
pub fn within_cooldown(record: &Record, now: DateTime<Utc>, cooldown: Duration) -> bool {
    record
        .history
        .success_time()
        .is_some_and(|success| elapsed(success, now) < cooldown)
}

/// Time from `since` to `now`, zero if `since` is in the future.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Last IPv4 and last IPv6 address of a lookup answer.
pub fn split_lookup(ips: &[IpAddr]) -> (Option<IpAddr>, Option<IpAddr>) {
    let ipv4 = ips.iter().rev().find(|ip| ip.is_ipv4()).copied();
    let ipv6 = ips.iter().rev().find(|ip| ip.is_ipv6()).copied();
    (ipv4, ipv6)
}

/// Whether the authoritative answer differs from the address to publish.
///
/// For [`IpVersion::Ipv4OrIpv6`] records, the target must match neither the
/// IPv4 nor the IPv6 answer to count as drift.
pub fn drifted(
    version: IpVersion,
    target: IpAddr,
    record_ipv4: Option<IpAddr>,
    record_ipv6: Option<IpAddr>,
) -> bool {
    match version {
        IpVersion::Ipv4 => Some(target) != record_ipv4,
        IpVersion::Ipv6 => Some(target) != record_ipv6,
        IpVersion::Ipv4OrIpv6 => Some(target) != record_ipv4 && Some(target) != record_ipv6,
    }
}
