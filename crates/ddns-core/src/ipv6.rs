//! IPv6 prefix masking and suffix grafting.
//!
//! Masking lets a delegated prefix (say a /56) be treated as one network
//! identity regardless of the interface identifier. Grafting builds the
//! address to publish from the public prefix and a configured suffix.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

/// Bits in an IPv6 address.
pub const IPV6_BITS: u8 = 128;

/// Zero every bit of `ip` beyond the first `bits` bits.
///
/// `bits` above 128 is treated as 128.
pub fn mask_ipv6(ip: Ipv6Addr, bits: u8) -> Ipv6Addr {
    let bits = u32::from(bits.min(IPV6_BITS));
    let mask = match bits {
        0 => 0,
        b => u128::MAX << (128 - b),
    };
    Ipv6Addr::from(u128::from(ip) & mask)
}

/// Mask IPv6 addresses, leave IPv4 addresses untouched.
pub fn mask_ip(ip: IpAddr, bits: u8) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => IpAddr::V6(mask_ipv6(v6, bits)),
        v4 => v4,
    }
}

/// Keep the public prefix of `public` and take the rest from `suffix`.
///
/// The suffix prefix length says how many trailing bits come from the
/// suffix address, rounded down to whole bytes. IPv4 addresses and a
/// missing suffix return `public` unchanged.
pub fn with_suffix(public: IpAddr, suffix: Option<Ipv6Prefix>) -> IpAddr {
    let (IpAddr::V6(public6), Some(suffix)) = (public, suffix) else {
        return public;
    };
    let prefix_bytes = usize::from((IPV6_BITS - suffix.bits) / 8);
    let mut octets = public6.octets();
    octets[prefix_bytes..].copy_from_slice(&suffix.addr.octets()[prefix_bytes..]);
    IpAddr::V6(Ipv6Addr::from(octets))
}

/// Parse an `IPV6_PREFIX` value of the form `/n`.
pub fn parse_prefix_length(s: &str) -> crate::Result<u8> {
    let digits = s.trim().strip_prefix('/').ok_or_else(|| {
        crate::Error::config(format!("IPv6 prefix \"{s}\" must start with a slash"))
    })?;
    let bits: u8 = digits.parse().map_err(|_| {
        crate::Error::config(format!("IPv6 prefix \"{s}\" is not a valid number of bits"))
    })?;
    if bits > IPV6_BITS {
        return Err(crate::Error::config(format!(
            "IPv6 prefix bits {bits} cannot be larger than {IPV6_BITS}"
        )));
    }
    Ok(bits)
}

/// An IPv6 address with a prefix length, e.g. `::72ad:8fbb:a54e:bedd/64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Prefix {
    /// Address part
    pub addr: Ipv6Addr,
    /// Prefix length in bits
    pub bits: u8,
}

impl Ipv6Prefix {
    /// Create a prefix, rejecting lengths above 128
    pub fn new(addr: Ipv6Addr, bits: u8) -> crate::Result<Self> {
        if bits > IPV6_BITS {
            return Err(crate::Error::config(format!(
                "IPv6 prefix length {bits} is larger than {IPV6_BITS}"
            )));
        }
        Ok(Self { addr, bits })
    }
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.bits)
    }
}

impl FromStr for Ipv6Prefix {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, bits) = s.trim().split_once('/').ok_or_else(|| {
            crate::Error::config(format!("IPv6 prefix \"{s}\" has no prefix length"))
        })?;
        let addr: Ipv6Addr = addr.parse().map_err(|_| {
            crate::Error::config(format!("IPv6 prefix \"{s}\" has an invalid address"))
        })?;
        let bits: u8 = bits.parse().map_err(|_| {
            crate::Error::config(format!("IPv6 prefix \"{s}\" has an invalid length"))
        })?;
        Self::new(addr, bits)
    }
}

impl Serialize for Ipv6Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv6Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v6(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn mask_is_idempotent_for_every_length() {
        let samples = [
            v6("2001:db8:a:b:1111:2222:3333:4444"),
            v6("ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"),
            v6("::1"),
            v6("fe80::abcd:1234"),
        ];
        for ip in samples {
            for bits in 0..=IPV6_BITS {
                let once = mask_ipv6(ip, bits);
                assert_eq!(mask_ipv6(once, bits), once, "{ip}/{bits}");
            }
        }
    }

    #[test]
    fn mask_boundaries() {
        let ip = v6("2001:db8:a:b:1111:2222:3333:4444");
        assert_eq!(mask_ipv6(ip, 128), ip);
        assert_eq!(mask_ipv6(ip, 0), Ipv6Addr::UNSPECIFIED);
        assert_eq!(mask_ipv6(ip, 56), v6("2001:db8:a::"));
        assert_eq!(mask_ipv6(ip, 64), v6("2001:db8:a:b::"));
    }

    #[test]
    fn mask_leaves_ipv4_alone() {
        let ip = IpAddr::from([203, 0, 113, 5]);
        assert_eq!(mask_ip(ip, 0), ip);
    }

    #[test]
    fn suffix_grafting() {
        let public = IpAddr::V6(v6("2001:db8:a:b:1111:2222:3333:4444"));
        let suffix: Ipv6Prefix = "::72ad:8fbb:a54e:bedd/64".parse().unwrap();
        assert_eq!(
            with_suffix(public, Some(suffix)),
            IpAddr::V6(v6("2001:db8:a:b:72ad:8fbb:a54e:bedd"))
        );
        assert_eq!(with_suffix(public, None), public);
        let v4 = IpAddr::from([203, 0, 113, 5]);
        assert_eq!(with_suffix(v4, Some(suffix)), v4);
    }

    #[test]
    fn prefix_length_parsing() {
        assert_eq!(parse_prefix_length("/128").unwrap(), 128);
        assert_eq!(parse_prefix_length("/56").unwrap(), 56);
        assert!(parse_prefix_length("56").is_err());
        assert!(parse_prefix_length("/129").is_err());
        assert!(parse_prefix_length("/abc").is_err());
    }
}
