// # Custom HTTP Provider
//
// For DNS services without a dedicated driver: a GET request to a fixed
// HTTPS URL carrying the IP address as a query parameter, with success
// decided by a regular expression over the response body.
//
// ## Settings
//
// ```json
// {
//   "provider": "custom",
//   "domain": "example.com",
//   "owner": "@",
//   "url": "https://dns.example.net/update?host=example.com&key=...",
//   "ipv4key": "ipv4",
//   "ipv6key": "ipv6",
//   "success_regex": "^(good|nochg)",
//   "ip_version": "ipv4"
// }
// ```

use async_trait::async_trait;
use ddns_core::config::ProviderSettings;
use ddns_core::ipv6::Ipv6Prefix;
use ddns_core::models::IpVersion;
use ddns_core::provider::utils;
use ddns_core::{Error, Provider, ProviderFactory, ProviderRegistry, Result};
use regex::Regex;
use reqwest::Url;
use std::net::IpAddr;
use std::sync::Arc;

/// Name used in the settings file
pub const NAME: &str = "custom";

/// Generic GET-and-match driver
pub struct CustomProvider {
    domain: String,
    owner: String,
    ip_version: IpVersion,
    ipv6_suffix: Option<Ipv6Prefix>,
    url: Url,
    ipv4_key: String,
    ipv6_key: String,
    success_regex: Regex,
    home_url: String,
}

// The URL usually embeds a secret
impl std::fmt::Debug for CustomProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomProvider")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ip_version", &self.ip_version)
            .field("host", &self.url.host_str())
            .field("success_regex", &self.success_regex.as_str())
            .finish()
    }
}

impl CustomProvider {
    /// Build a provider from its settings entry
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let raw_url = settings.required_string("url")?;
        let url = Url::parse(&raw_url)
            .map_err(|e| Error::config(format!("{NAME}: parsing url: {e}")))?;
        if url.scheme() != "https" {
            return Err(Error::config(format!(
                "{NAME}: url must use https, not {}",
                url.scheme()
            )));
        }
        let success_regex = settings.required_string("success_regex")?;
        let success_regex = Regex::new(&success_regex)
            .map_err(|e| Error::config(format!("{NAME}: success_regex: {e}")))?;

        Ok(Self {
            domain: settings.domain.clone(),
            owner: settings.owner.clone(),
            ip_version: settings.ip_version,
            ipv6_suffix: settings.ipv6_suffix,
            home_url: format!("https://{}/", url.host_str().unwrap_or_default()),
            url,
            ipv4_key: settings.required_string("ipv4key")?,
            ipv6_key: settings.required_string("ipv6key")?,
            success_regex,
        })
    }

    /// Update URL for `ip`, replacing any value already set for the IP key
    fn update_url(&self, ip: IpAddr) -> Url {
        let (key, value) = utils::ip_query_param(ip, &self.ipv4_key, &self.ipv6_key);
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| *k != key)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&key, &value);
        url
    }
}

#[async_trait]
impl Provider for CustomProvider {
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
        Some(&self.home_url)
    }

    async fn update(&self, client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        let response = client.get(self.update_url(ip)).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(Error::from_status(status.as_u16(), utils::to_single_line(&body)));
        }
        if self.success_regex.is_match(&body) {
            tracing::debug!("{} answered {}", self.build_domain_name(), utils::to_single_line(&body));
            return Ok(ip);
        }
        Err(Error::unknown_response(utils::to_single_line(&body)))
    }
}

/// Factory for creating custom providers
pub struct CustomFactory;

impl ProviderFactory for CustomFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(CustomProvider::from_settings(settings)?))
    }
}

/// Register the custom provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(NAME, Box::new(CustomFactory));
}
