// # HTTP Public IP Fetcher
//
// This crate discovers the public IP address by asking HTTP echo services
// (ipify, icanhazip, ...) who is calling.
//
// ## Architecture
//
// Three rings of echo URLs, one per IP flavor (mixed, IPv4, IPv6). Every
// call takes the next URL of the ring, so load is spread across services
// and a failing service does not block later calls.
//
// A service answering 403 or 429 is marked banned and skipped for the rest
// of the process lifetime. When every URL of a ring is banned, calls fail
// with a ban error listing them.

pub mod providers;

pub use providers::HttpProvider;

use ddns_core::config::Settings;
use ddns_core::models::IpVersion;
use ddns_core::provider::utils::{find_ipv4_addresses, find_ipv6_addresses, to_single_line};
use ddns_core::publicip::Ring;
use ddns_core::traits::PublicIpFetcher;
use ddns_core::{Error, Result};

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// Echo URLs of one IP flavor with the ones that banned us.
struct UrlRing {
    urls: Ring<String>,
    banned: Mutex<BTreeMap<usize, String>>,
}

impl UrlRing {
    fn new(providers: &[HttpProvider], version: IpVersion) -> Result<Self> {
        let urls = providers
            .iter()
            .map(|provider| {
                provider.url(version).ok_or_else(|| {
                    Error::config(format!(
                        "public IP HTTP provider {provider} does not support {}",
                        version.ip_kind()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            urls: Ring::new(urls)?,
            banned: Mutex::new(BTreeMap::new()),
        })
    }

    /// Next URL that did not ban us, with its index
    fn next(&self) -> Result<(usize, &str)> {
        let banned = self.banned.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..self.urls.len() {
            let index = self.urls.next_index();
            if !banned.contains_key(&index)
                && let Some(url) = self.urls.get(index)
            {
                return Ok((index, url));
            }
        }
        let summary = banned
            .iter()
            .filter_map(|(index, reason)| {
                self.urls.get(*index).map(|url| format!("{url} ({reason})"))
            })
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::banned(summary))
    }

    fn ban(&self, index: usize, reason: String) {
        self.banned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index, reason);
    }
}

/// Public IP fetcher backed by HTTP echo services
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    ip: UrlRing,
    ip4: UrlRing,
    ip6: UrlRing,
}

impl HttpFetcher {
    /// Create a fetcher
    ///
    /// # Parameters
    ///
    /// - `client`: shared HTTP client
    /// - `timeout`: per-request timeout
    /// - `ip`, `ip4`, `ip6`: services cycled for each IP flavor
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        ip: &[HttpProvider],
        ip4: &[HttpProvider],
        ip6: &[HttpProvider],
    ) -> Result<Self> {
        Ok(Self {
            client,
            timeout,
            ip: UrlRing::new(ip, IpVersion::Ipv4OrIpv6)?,
            ip4: UrlRing::new(ip4, IpVersion::Ipv4)?,
            ip6: UrlRing::new(ip6, IpVersion::Ipv6)?,
        })
    }

    /// Create a fetcher from the `PUBLICIP*_HTTP_PROVIDERS` settings
    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Result<Self> {
        let public_ip = &settings.public_ip;
        Self::new(
            client,
            settings.http_timeout,
            &providers::resolve(&public_ip.http_providers, IpVersion::Ipv4OrIpv6)?,
            &providers::resolve(&public_ip.ipv4_http_providers, IpVersion::Ipv4)?,
            &providers::resolve(&public_ip.ipv6_http_providers, IpVersion::Ipv6)?,
        )
    }

    async fn fetch_from(&self, ring: &UrlRing, version: IpVersion) -> Result<IpAddr> {
        let (index, url) = ring.next()?;
        match self.fetch(url, version).await {
            Err(Error::Banned(reason)) => {
                tracing::warn!("Public IP service {} banned us: {}", url, reason);
                ring.ban(index, reason.clone());
                Err(Error::Banned(format!("{url}: {reason}")))
            }
            result => result,
        }
    }

    async fn fetch(&self, url: &str, version: IpVersion) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::public_ip(format!("requesting {url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::public_ip(format!("reading response from {url}: {e}")))?;

        match status {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::banned(format!(
                    "{} ({})",
                    status.as_u16(),
                    to_single_line(&body)
                )));
            }
            _ => return Err(Error::bad_status(status.as_u16(), to_single_line(&body))),
        }

        parse_single_ip(&body, version)
            .map_err(|e| Error::public_ip(format!("from {url}: {e}")))
    }
}

/// The one IP address of `version` in an echo response body.
///
/// For the mixed flavor a single IPv4 address wins over IPv6 ones.
pub fn parse_single_ip(body: &str, version: IpVersion) -> Result<IpAddr> {
    let ipv4 = find_ipv4_addresses(body);
    let ipv6 = find_ipv6_addresses(body);

    let too_many = |count: usize, kind: &str| {
        Error::unknown_response(format!("found {count} {kind} addresses instead of 1"))
    };

    match version {
        IpVersion::Ipv4 => match ipv4.as_slice() {
            [] => Err(Error::no_ip(format!("no {} found", version.ip_kind()))),
            [ip] => Ok(IpAddr::V4(*ip)),
            many => Err(too_many(many.len(), "IPv4")),
        },
        IpVersion::Ipv6 => match ipv6.as_slice() {
            [] => Err(Error::no_ip(format!("no {} found", version.ip_kind()))),
            [ip] => Ok(IpAddr::V6(*ip)),
            many => Err(too_many(many.len(), "IPv6")),
        },
        IpVersion::Ipv4OrIpv6 => match (ipv4.as_slice(), ipv6.as_slice()) {
            ([ip], _) => Ok(IpAddr::V4(*ip)),
            ([], [ip]) => Ok(IpAddr::V6(*ip)),
            ([], []) => Err(Error::no_ip("no IP found")),
            ([], many) => Err(too_many(many.len(), "IPv6")),
            (many, _) => Err(too_many(many.len(), "IPv4")),
        },
    }
}

#[async_trait::async_trait]
impl PublicIpFetcher for HttpFetcher {
    async fn ip(&self) -> Result<IpAddr> {
        self.fetch_from(&self.ip, IpVersion::Ipv4OrIpv6).await
    }

    async fn ip4(&self) -> Result<IpAddr> {
        self.fetch_from(&self.ip4, IpVersion::Ipv4).await
    }

    async fn ip6(&self) -> Result<IpAddr> {
        self.fetch_from(&self.ip6, IpVersion::Ipv6).await
    }
}
