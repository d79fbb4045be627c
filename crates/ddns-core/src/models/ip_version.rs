//! IP version a record tracks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// IP version tracked by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpVersion {
    /// IPv4 only
    #[serde(rename = "ipv4")]
    Ipv4,
    /// IPv6 only
    #[serde(rename = "ipv6")]
    Ipv6,
    /// Whichever address the mixed public IP channel returns
    #[default]
    #[serde(rename = "ipv4 or ipv6")]
    Ipv4OrIpv6,
}

impl IpVersion {
    /// Whether an address of the given family satisfies this version.
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::Ipv4 => ip.is_ipv4(),
            IpVersion::Ipv6 => ip.is_ipv6(),
            IpVersion::Ipv4OrIpv6 => true,
        }
    }

    /// Human word used in log lines ("IPv4", "IPv6", "IP").
    pub fn ip_kind(&self) -> &'static str {
        match self {
            IpVersion::Ipv4 => "IPv4",
            IpVersion::Ipv6 => "IPv6",
            IpVersion::Ipv4OrIpv6 => "IP",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IpVersion::Ipv4 => "ipv4",
            IpVersion::Ipv6 => "ipv6",
            IpVersion::Ipv4OrIpv6 => "ipv4 or ipv6",
        };
        f.write_str(s)
    }
}

impl FromStr for IpVersion {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ipv4" => Ok(IpVersion::Ipv4),
            "ipv6" => Ok(IpVersion::Ipv6),
            "" | "ipv4 or ipv6" => Ok(IpVersion::Ipv4OrIpv6),
            other => Err(crate::Error::config(format!(
                "ip version \"{other}\" is not valid, expected one of: ipv4, ipv6, ipv4 or ipv6"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        for version in [IpVersion::Ipv4, IpVersion::Ipv6, IpVersion::Ipv4OrIpv6] {
            let parsed: IpVersion = version.to_string().parse().unwrap();
            assert_eq!(parsed, version);
        }
        assert_eq!("".parse::<IpVersion>().unwrap(), IpVersion::Ipv4OrIpv6);
        assert!("ipv5".parse::<IpVersion>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&IpVersion::Ipv4OrIpv6).unwrap();
        assert_eq!(json, "\"ipv4 or ipv6\"");
        let version: IpVersion = serde_json::from_str("\"ipv6\"").unwrap();
        assert_eq!(version, IpVersion::Ipv6);
    }
}
