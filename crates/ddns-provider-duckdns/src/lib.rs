// # DuckDNS Provider
//
// Updates `<name>.duckdns.org` records through the DuckDNS HTTP API.
//
// ## Settings
//
// ```json
// {
//   "provider": "duckdns",
//   "domain": "myhost.duckdns.org",
//   "owner": "@",
//   "token": "00000000-0000-0000-0000-000000000000",
//   "provider_ip": false,
//   "ip_version": "ipv4"
// }
// ```
//
// `duckdns.org` is a public suffix: the registered domain is always
// `<name>.duckdns.org`. For older settings files, an empty or bare
// `duckdns.org` domain takes its name from the last owner label.
//
// ## API Reference
//
// - GET `/update?verbose=true&domains=...&token=...&ip=...`
// - Answers `OK` followed by the IP address, or `KO`

use async_trait::async_trait;
use ddns_core::config::ProviderSettings;
use ddns_core::ipv6::Ipv6Prefix;
use ddns_core::models::IpVersion;
use ddns_core::provider::utils;
use ddns_core::{Error, Provider, ProviderFactory, ProviderRegistry, Result};
use std::net::IpAddr;
use std::sync::Arc;

/// Name used in the settings file
pub const NAME: &str = "duckdns";

const ETLD: &str = "duckdns.org";
const DUCKDNS_API_BASE: &str = "https://www.duckdns.org";

/// DuckDNS record driver
pub struct DuckDnsProvider {
    domain: String,
    owner: String,
    ip_version: IpVersion,
    ipv6_suffix: Option<Ipv6Prefix>,
    token: String,
    use_provider_ip: bool,
    base_url: String,
}

impl std::fmt::Debug for DuckDnsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDnsProvider")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ip_version", &self.ip_version)
            .field("token", &"<REDACTED>")
            .field("use_provider_ip", &self.use_provider_ip)
            .finish()
    }
}

impl DuckDnsProvider {
    /// Build a provider from its settings entry
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let (domain, owner) = split_domain(&settings.domain, &settings.owner);
        let token = settings.required_string("token")?;
        validate(&domain, &owner, &token)?;

        Ok(Self {
            domain,
            owner,
            ip_version: settings.ip_version,
            ipv6_suffix: settings.ipv6_suffix,
            token,
            use_provider_ip: settings.bool("provider_ip")?,
            base_url: DUCKDNS_API_BASE.to_string(),
        })
    }

    /// Send updates to `base_url` instead of www.duckdns.org
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Let DuckDNS use the address the request comes from.
    ///
    /// Not possible for IPv6 records with a suffix, since the suffix must be
    /// grafted locally.
    fn uses_provider_ip(&self, ip: IpAddr) -> bool {
        self.use_provider_ip && (ip.is_ipv4() || self.ipv6_suffix.is_none())
    }
}

/// Registered domain and owner, accepting the legacy bare `duckdns.org` form
fn split_domain(domain: &str, owner: &str) -> (String, String) {
    if !domain.is_empty() && domain != ETLD {
        return (domain.to_string(), owner.to_string());
    }
    match owner.rsplit_once('.') {
        Some((rest, name)) => (format!("{name}.{ETLD}"), rest.to_string()),
        None => (format!("{owner}.{ETLD}"), "@".to_string()),
    }
}

fn validate(domain: &str, owner: &str, token: &str) -> Result<()> {
    let name = domain.strip_suffix(ETLD).and_then(|n| n.strip_suffix('.'));
    if name.is_none_or(str::is_empty) {
        return Err(Error::config(format!(
            "{NAME}: {domain:?} must have the effective TLD {ETLD:?}"
        )));
    }
    if owner == "*" {
        return Err(Error::config(format!("{NAME}: owner cannot be a wildcard")));
    }
    if owner.matches('.').count() > 1 {
        return Err(Error::config(format!("{NAME}: {domain:?} has more than 3 labels")));
    }
    if !is_uuid(token) {
        return Err(Error::config(format!("{NAME}: token is not a valid UUID")));
    }
    Ok(())
}

fn is_uuid(token: &str) -> bool {
    let bytes = token.as_bytes();
    bytes.len() == 36
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => *b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}

#[async_trait]
impl Provider for DuckDnsProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    fn ipv6_suffix(&self) -> Option<Ipv6Prefix> {
        self.ipv6_suffix
    }

    fn home_url(&self) -> Option<&str> {
        Some("https://www.duckdns.org")
    }

    async fn update(&self, client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        let provider_ip = self.uses_provider_ip(ip);
        let mut query = vec![
            ("verbose", "true".to_string()),
            ("domains", self.build_domain_name()),
            ("token", self.token.clone()),
        ];
        if !provider_ip {
            let key = if ip.is_ipv6() { "ipv6" } else { "ip" };
            query.push((key, ip.to_string()));
        }
        tracing::debug!("Updating {} -> {}", self.build_domain_name(), ip);

        let response = client
            .get(format!("{}/update", self.base_url))
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), utils::to_single_line(&body)));
        }

        if body.starts_with("KO") {
            return Err(Error::auth("KO"));
        }
        if !body.starts_with("OK") {
            return Err(Error::unknown_response(utils::to_single_line(&body)));
        }

        let received = utils::find_ip(&body, ip.is_ipv6())
            .ok_or_else(|| Error::no_ip(utils::to_single_line(&body)))?;
        if !provider_ip && received != ip {
            return Err(Error::IpMismatch { sent: ip, received });
        }
        Ok(received)
    }
}

/// Factory for creating DuckDNS providers
pub struct DuckDnsFactory;

impl ProviderFactory for DuckDnsFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(DuckDnsProvider::from_settings(settings)?))
    }
}

/// Register the DuckDNS provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(NAME, Box::new(DuckDnsFactory));
}
