//! Public IP echo services reachable over HTTPS.

use ddns_core::models::IpVersion;
use ddns_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Prefix of a custom echo URL in provider lists, e.g. `url:https://ip.example.com`.
pub const CUSTOM_PREFIX: &str = "url:";

/// An HTTP echo service answering with the caller's IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpProvider {
    Ifconfig,
    Ipify,
    Ipinfo,
    Spdyn,
    Ipleak,
    Icanhazip,
    Ident,
    Nnev,
    Wtfismyip,
    Seeip,
    Changeip,
    /// Any HTTPS URL given as `url:https://...`
    Custom(String),
}

const BUILT_IN: [HttpProvider; 11] = [
    HttpProvider::Ifconfig,
    HttpProvider::Ipify,
    HttpProvider::Ipinfo,
    HttpProvider::Spdyn,
    HttpProvider::Ipleak,
    HttpProvider::Icanhazip,
    HttpProvider::Ident,
    HttpProvider::Nnev,
    HttpProvider::Wtfismyip,
    HttpProvider::Seeip,
    HttpProvider::Changeip,
];

impl HttpProvider {
    /// Built-in services able to answer for `version`
    pub fn list_for(version: IpVersion) -> Vec<HttpProvider> {
        BUILT_IN
            .iter()
            .filter(|provider| provider.url(version).is_some())
            .cloned()
            .collect()
    }

    /// Echo URL for `version`, if the service has one
    pub fn url(&self, version: IpVersion) -> Option<String> {
        use HttpProvider::*;

        let url = match (self, version) {
            (Custom(url), _) => return Some(url.clone()),

            (Ipify, IpVersion::Ipv4) => "https://api.ipify.org",
            (Ipleak, IpVersion::Ipv4) => "https://ipv4.ipleak.net/json",
            (Icanhazip, IpVersion::Ipv4) => "https://ipv4.icanhazip.com",
            (Ident, IpVersion::Ipv4) => "https://v4.ident.me",
            (Nnev, IpVersion::Ipv4) => "https://ip4.nnev.de",
            (Wtfismyip, IpVersion::Ipv4) => "https://ipv4.wtfismyip.com/text",
            (Seeip, IpVersion::Ipv4) => "https://ipv4.seeip.org",

            (Ipify, IpVersion::Ipv6) => "https://api6.ipify.org",
            (Ipleak, IpVersion::Ipv6) => "https://ipv6.ipleak.net/json",
            (Icanhazip, IpVersion::Ipv6) => "https://ipv6.icanhazip.com",
            (Ident, IpVersion::Ipv6) => "https://v6.ident.me",
            (Nnev, IpVersion::Ipv6) => "https://ip6.nnev.de",
            (Wtfismyip, IpVersion::Ipv6) => "https://ipv6.wtfismyip.com/text",
            (Seeip, IpVersion::Ipv6) => "https://ipv6.seeip.org",

            (Ipify, IpVersion::Ipv4OrIpv6) => "https://api64.ipify.org",
            (Ifconfig, IpVersion::Ipv4OrIpv6) => "https://ifconfig.io/ip",
            (Ipinfo, IpVersion::Ipv4OrIpv6) => "https://ipinfo.io/ip",
            (Spdyn, IpVersion::Ipv4OrIpv6) => "https://checkip.spdyn.de",
            (Ipleak, IpVersion::Ipv4OrIpv6) => "https://ipleak.net/json",
            (Icanhazip, IpVersion::Ipv4OrIpv6) => "https://icanhazip.com",
            (Ident, IpVersion::Ipv4OrIpv6) => "https://ident.me",
            (Nnev, IpVersion::Ipv4OrIpv6) => "https://ip.nnev.de",
            (Wtfismyip, IpVersion::Ipv4OrIpv6) => "https://wtfismyip.com/text",
            (Seeip, IpVersion::Ipv4OrIpv6) => "https://api.seeip.org",
            (Changeip, IpVersion::Ipv4OrIpv6) => "https://ip.changeip.com",

            _ => return None,
        };
        Some(url.to_string())
    }
}

impl fmt::Display for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpProvider::Ifconfig => "ifconfig",
            HttpProvider::Ipify => "ipify",
            HttpProvider::Ipinfo => "ipinfo",
            HttpProvider::Spdyn => "spdyn",
            HttpProvider::Ipleak => "ipleak",
            HttpProvider::Icanhazip => "icanhazip",
            HttpProvider::Ident => "ident",
            HttpProvider::Nnev => "nnev",
            HttpProvider::Wtfismyip => "wtfismyip",
            HttpProvider::Seeip => "seeip",
            HttpProvider::Changeip => "changeip",
            HttpProvider::Custom(url) => return write!(f, "{CUSTOM_PREFIX}{url}"),
        };
        f.write_str(name)
    }
}

impl FromStr for HttpProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(url) = s.strip_prefix(CUSTOM_PREFIX) {
            if !url.starts_with("https://") {
                return Err(Error::config(format!(
                    "custom public IP HTTP provider {url:?} must use https"
                )));
            }
            return Ok(HttpProvider::Custom(url.to_string()));
        }
        BUILT_IN
            .iter()
            .find(|provider| provider.to_string() == s.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::config(format!("unknown public IP echo HTTP provider: {s}")))
    }
}

/// Providers named in a settings list, `all` expanding to every capable one.
///
/// Every provider must support `version`.
pub fn resolve(names: &[String], version: IpVersion) -> Result<Vec<HttpProvider>> {
    let mut providers = Vec::new();
    for name in names {
        if name == "all" {
            providers.extend(HttpProvider::list_for(version));
            continue;
        }
        let provider: HttpProvider = name.parse()?;
        if provider.url(version).is_none() {
            return Err(Error::config(format!(
                "public IP HTTP provider {provider} does not support {}",
                version.ip_kind()
            )));
        }
        providers.push(provider);
    }
    providers.dedup();
    if providers.is_empty() {
        return Err(Error::config(format!(
            "no public IP HTTP provider for {}",
            version.ip_kind()
        )));
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_display() {
        for provider in BUILT_IN {
            assert_eq!(provider.to_string().parse::<HttpProvider>().unwrap(), provider);
        }
        assert_eq!(
            "url:https://ip.example.com".parse::<HttpProvider>().unwrap(),
            HttpProvider::Custom("https://ip.example.com".to_string())
        );
        assert!("url:http://ip.example.com".parse::<HttpProvider>().is_err());
        assert!("google".parse::<HttpProvider>().is_err());
    }

    #[test]
    fn all_expands_per_version() {
        let v4 = resolve(&["all".to_string()], IpVersion::Ipv4).unwrap();
        assert_eq!(v4.len(), 7);
        assert!(!v4.contains(&HttpProvider::Changeip));

        let mixed = resolve(&["all".to_string()], IpVersion::Ipv4OrIpv6).unwrap();
        assert_eq!(mixed.len(), 11);
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = resolve(&["changeip".to_string()], IpVersion::Ipv6).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: public IP HTTP provider changeip does not support IPv6"
        );
    }
}
