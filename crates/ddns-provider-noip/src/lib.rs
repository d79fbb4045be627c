// # No-IP Provider
//
// dyndns2-style updates against dynupdate.no-ip.com.
//
// ## Settings
//
// ```json
// {
//   "provider": "noip",
//   "domain": "example.ddns.net",
//   "owner": "@",
//   "username": "...",
//   "password": "...",
//   "provider_ip": false,
//   "ip_version": "ipv4"
// }
// ```

use async_trait::async_trait;
use ddns_core::config::ProviderSettings;
use ddns_core::ipv6::Ipv6Prefix;
use ddns_core::models::IpVersion;
use ddns_core::provider::utils;
use ddns_core::{Error, Provider, ProviderFactory, ProviderRegistry, Result};
use std::net::IpAddr;
use std::sync::Arc;

/// Name used in the settings file
pub const NAME: &str = "noip";

const NOIP_API_BASE: &str = "https://dynupdate.no-ip.com";
const MAX_USERNAME_LENGTH: usize = 50;

/// No-IP record driver
pub struct NoIpProvider {
    domain: String,
    owner: String,
    ip_version: IpVersion,
    ipv6_suffix: Option<Ipv6Prefix>,
    username: String,
    password: String,
    use_provider_ip: bool,
    base_url: String,
}

impl std::fmt::Debug for NoIpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoIpProvider")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ip_version", &self.ip_version)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("use_provider_ip", &self.use_provider_ip)
            .finish()
    }
}

impl NoIpProvider {
    /// Build a provider from its settings entry
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let username = settings.required_string("username")?;
        let password = settings.required_string("password")?;
        if username.len() > MAX_USERNAME_LENGTH {
            return Err(Error::config(format!(
                "{NAME}: username is longer than {MAX_USERNAME_LENGTH} characters"
            )));
        }
        if settings.owner == "*" {
            return Err(Error::config(format!("{NAME}: owner cannot be a wildcard")));
        }

        // No-IP only detects the caller's IPv4 address
        let use_provider_ip =
            settings.bool("provider_ip")? && settings.ip_version != IpVersion::Ipv6;

        Ok(Self {
            domain: settings.domain.clone(),
            owner: settings.owner.clone(),
            ip_version: settings.ip_version,
            ipv6_suffix: settings.ipv6_suffix,
            username,
            password,
            use_provider_ip,
            base_url: NOIP_API_BASE.to_string(),
        })
    }

    /// Send updates to `base_url` instead of dynupdate.no-ip.com
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn uses_provider_ip(&self, ip: IpAddr) -> bool {
        self.use_provider_ip && (ip.is_ipv4() || self.ipv6_suffix.is_none())
    }
}

/// Error for a fixed dyndns2 answer, if `body` is one
fn answer_error(body: &str) -> Option<Error> {
    let err = match body {
        "" => Error::unknown_response("empty response"),
        "911" => Error::unknown_response("DNS server side error"),
        "abuse" => Error::banned("abuse"),
        "!donator" => Error::unknown_response("feature is not available to this account"),
        "badagent" => Error::banned("user agent is banned"),
        "badauth" => Error::auth("badauth"),
        "nohost" => Error::not_found("hostname does not exist"),
        _ => return None,
    };
    Some(err)
}

#[async_trait]
impl Provider for NoIpProvider {
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
        Some("https://www.noip.com/")
    }

    async fn update(&self, client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        let provider_ip = self.uses_provider_ip(ip);
        let mut query = vec![(
            "hostname",
            utils::build_url_query_hostname(&self.owner, &self.domain),
        )];
        if !provider_ip {
            query.push(("myip", ip.to_string()));
        }
        tracing::debug!("Updating {} -> {}", self.build_domain_name(), ip);

        let response = client
            .get(format!("{}/nic/update", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(Error::from_status(status.as_u16(), utils::to_single_line(&body)));
        }

        let body = body.trim();
        if let Some(err) = answer_error(body) {
            return Err(err);
        }
        if !body.contains("good") && !body.contains("nochg") {
            return Err(Error::unknown_response(utils::to_single_line(body)));
        }

        match utils::find_ip(body, ip.is_ipv6()) {
            Some(received) if provider_ip || received == ip => Ok(received),
            Some(received) => Err(Error::IpMismatch { sent: ip, received }),
            None if provider_ip => Ok(ip),
            None => Err(Error::no_ip(body.to_string())),
        }
    }
}

/// Factory for creating No-IP providers
pub struct NoIpFactory;

impl ProviderFactory for NoIpFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(NoIpProvider::from_settings(settings)?))
    }
}

/// Register the No-IP provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(NAME, Box::new(NoIpFactory));
}
