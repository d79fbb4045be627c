// # Cloudflare DNS Provider
//
// Cloudflare API v4 driver for the DDNS updater.
//
// ## Settings
//
// ```json
// {
//   "provider": "cloudflare",
//   "zone_identifier": "...",
//   "domain": "example.com",
//   "owner": "@",
//   "ttl": 600,
//   "token": "...",
//   "proxied": false,
//   "ip_version": "ipv4"
// }
// ```
//
// Authentication is one of:
// - `token`: API token with Zone:DNS:Edit permission (bearer)
// - `email` and `key`: global API key
// - `user_service_key`: origin CA key (`v1.0-...`)
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns_core::config::ProviderSettings;
use ddns_core::models::IpVersion;
use ddns_core::provider::utils;
use ddns_core::{Error, Provider, ProviderFactory, ProviderRegistry, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Name used in the settings file
pub const NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// How requests are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Scoped API token
    Token(String),
    /// Account email and global API key
    EmailKey { email: String, key: String },
    /// Origin CA user service key
    UserServiceKey(String),
}

impl Auth {
    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::Token(token) => request.bearer_auth(token),
            Auth::EmailKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
            Auth::UserServiceKey(key) => request.header("X-Auth-User-Service-Key", key),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Auth::Token(_) => "token",
            Auth::EmailKey { .. } => "email+key",
            Auth::UserServiceKey(_) => "user service key",
        }
    }
}

/// Cloudflare DNS record driver
///
/// One instance handles a single record. The record is created if the zone
/// does not hold it yet.
pub struct CloudflareProvider {
    domain: String,
    owner: String,
    ip_version: IpVersion,
    ipv6_suffix: Option<ddns_core::ipv6::Ipv6Prefix>,
    zone_identifier: String,
    auth: Auth,
    proxied: bool,
    ttl: u32,
    base_url: String,
}

// Credentials stay out of logs
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ip_version", &self.ip_version)
            .field("zone_identifier", &self.zone_identifier)
            .field("auth", &format!("<{} REDACTED>", self.auth.kind()))
            .field("proxied", &self.proxied)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    /// The result of a successful response
    fn into_result(self) -> Result<T> {
        if !self.success || !self.errors.is_empty() {
            let errors: Vec<String> = self
                .errors
                .iter()
                .map(|e| format!("error {}: {}", e.code, e.message))
                .collect();
            return Err(Error::unknown_response(format!(
                "unsuccessful response: {}",
                errors.join("; ")
            )));
        }
        self.result
            .ok_or_else(|| Error::unknown_response("no result in response"))
    }
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct RecordPayload<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    proxied: bool,
    ttl: u32,
}

/// What the zone currently holds for the record
enum Existing {
    Missing,
    UpToDate,
    Stale { id: String },
}

impl CloudflareProvider {
    /// Build a provider from its settings entry
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let auth = parse_auth(settings)?;
        let zone_identifier = settings.required_string("zone_identifier")?;
        let ttl = match settings.u32("ttl")? {
            Some(ttl) if ttl > 0 => ttl,
            _ => return Err(Error::config(format!("{NAME}: ttl is required"))),
        };

        Ok(Self {
            domain: settings.domain.clone(),
            owner: settings.owner.clone(),
            ip_version: settings.ip_version,
            ipv6_suffix: settings.ipv6_suffix,
            zone_identifier,
            auth,
            proxied: settings.bool("proxied")?,
            ttl,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Send API calls to `base_url` instead of api.cloudflare.com
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_identifier)
    }

    fn request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.auth
            .apply(request)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let response = self.request(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), utils::to_single_line(&body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::unknown_response(format!(
                "cannot decode response: {e}: {}",
                utils::to_single_line(&body)
            ))
        })
    }

    async fn find_record(&self, client: &reqwest::Client, ip: IpAddr) -> Result<Existing> {
        let name = utils::build_url_query_hostname(&self.owner, &self.domain);
        let request = client.get(self.records_url()).query(&[
            ("type", record_type(ip)),
            ("name", name.as_str()),
            ("page", "1"),
            ("per_page", "1"),
        ]);

        let records: Vec<DnsRecord> = self.send(request).await?.into_result()?;
        match records.as_slice() {
            [] => Ok(Existing::Missing),
            [record] if record.content == ip.to_string() => Ok(Existing::UpToDate),
            [record] => Ok(Existing::Stale {
                id: record.id.clone(),
            }),
            _ => Err(Error::unknown_response(format!(
                "received {} records instead of 1",
                records.len()
            ))),
        }
    }

    fn payload<'a>(&self, name: &'a str, ip: IpAddr) -> RecordPayload<'a> {
        RecordPayload {
            record_type: record_type(ip),
            name,
            content: ip.to_string(),
            proxied: self.proxied,
            ttl: self.ttl,
        }
    }

    async fn create_record(&self, client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        let name = utils::build_url_query_hostname(&self.owner, &self.domain);
        let payload = self.payload(&name, ip);
        tracing::info!("Creating {} record {} -> {}", payload.record_type, name, ip);

        let request = client.post(self.records_url()).json(&payload);
        let record: DnsRecord = self.send(request).await?.into_result()?;
        check_content(ip, &record.content)
    }

    async fn update_record(&self, client: &reqwest::Client, id: &str, ip: IpAddr) -> Result<IpAddr> {
        let name = utils::build_url_query_hostname(&self.owner, &self.domain);
        let payload = self.payload(&name, ip);
        tracing::debug!("Updating {} record {} -> {}", payload.record_type, name, ip);

        let url = format!("{}/{}", self.records_url(), id);
        let request = client.put(url).json(&payload);
        let record: DnsRecord = self.send(request).await?.into_result()?;
        check_content(ip, &record.content)
    }
}

fn record_type(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    }
}

/// The record content echoed back must be the IP sent
fn check_content(sent: IpAddr, content: &str) -> Result<IpAddr> {
    let received: IpAddr = content
        .parse()
        .map_err(|_| Error::no_ip(format!("malformed record content {content:?}")))?;
    if received != sent {
        return Err(Error::IpMismatch { sent, received });
    }
    Ok(received)
}

const KEY_PATTERN: &str = r"^[a-zA-Z0-9]+$";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const USER_SERVICE_KEY_PATTERN: &str = r"^v1\.0.+$";

fn matches(pattern: &str, value: &str) -> Result<bool> {
    let regex = Regex::new(pattern)
        .map_err(|e| Error::config(format!("{NAME}: invalid pattern {pattern:?}: {e}")))?;
    Ok(regex.is_match(value))
}

fn parse_auth(settings: &ProviderSettings) -> Result<Auth> {
    if let Some(key) = settings.string("key") {
        if !matches(KEY_PATTERN, key)? {
            return Err(Error::config(format!("{NAME}: key is malformed")));
        }
        let email = settings.string("email").unwrap_or_default();
        if !matches(EMAIL_PATTERN, email)? {
            return Err(Error::config(format!("{NAME}: email is malformed")));
        }
        return Ok(Auth::EmailKey {
            email: email.to_string(),
            key: key.to_string(),
        });
    }
    if let Some(key) = settings.string("user_service_key") {
        if !matches(USER_SERVICE_KEY_PATTERN, key)? {
            return Err(Error::config(format!("{NAME}: user service key is malformed")));
        }
        return Ok(Auth::UserServiceKey(key.to_string()));
    }
    settings
        .string("token")
        .map(|token| Auth::Token(token.to_string()))
        .ok_or_else(|| {
            Error::config(format!(
                "{NAME}: one of token, email and key, or user_service_key is required"
            ))
        })
}

#[async_trait]
impl Provider for CloudflareProvider {
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

    fn proxied(&self) -> bool {
        self.proxied
    }

    fn ipv6_suffix(&self) -> Option<ddns_core::ipv6::Ipv6Prefix> {
        self.ipv6_suffix
    }

    fn home_url(&self) -> Option<&str> {
        Some("https://www.cloudflare.com")
    }

    async fn update(&self, client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        match self.find_record(client, ip).await? {
            Existing::UpToDate => {
                tracing::debug!("{} already points to {}", self.build_domain_name(), ip);
                Ok(ip)
            }
            Existing::Missing => self.create_record(client, ip).await,
            Existing::Stale { id } => self.update_record(client, &id, ip).await,
        }
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl ProviderFactory for CloudflareFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(CloudflareProvider::from_settings(settings)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(NAME, Box::new(CloudflareFactory));
}
