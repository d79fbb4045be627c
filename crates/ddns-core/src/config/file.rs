//! Provider settings file (`config.json`)
//!
//! ```json
//! {
//!   "settings": [
//!     {
//!       "provider": "cloudflare",
//!       "domain": "example.com",
//!       "owner": "@,www",
//!       "ip_version": "ipv4",
//!       "zone_identifier": "...",
//!       "token": "...",
//!       "ttl": 600
//!     }
//!   ]
//! }
//! ```
//!
//! Each entry expands into one [`ProviderSettings`] per record. Fields other
//! than the common ones are kept in `extra` for the provider factory.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::ipv6::Ipv6Prefix;
use crate::models::IpVersion;

/// File name of the settings file inside the data directory.
pub const FILE_NAME: &str = "config.json";

const COMMON_KEYS: &[&str] = &[
    "provider",
    "domain",
    "owner",
    "host",
    "ip_version",
    "ipv6_suffix",
    "ip_method",
    "delay",
];

/// Settings of a single record, ready for a provider factory.
#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    /// Provider name, e.g. `cloudflare`
    pub provider: String,
    /// Registered domain
    pub domain: String,
    /// Owner label(s), `@` for the apex
    pub owner: String,
    /// IP version tracked
    pub ip_version: IpVersion,
    /// Interface suffix grafted on the public IPv6 prefix
    pub ipv6_suffix: Option<Ipv6Prefix>,
    /// Provider-specific fields
    pub extra: Map<String, Value>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Provider-specific fields hold credentials
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ip_version", &self.ip_version)
            .field("ipv6_suffix", &self.ipv6_suffix)
            .field("extra", &format!("<{} fields REDACTED>", self.extra.len()))
            .finish()
    }
}

impl ProviderSettings {
    /// Create settings without provider-specific fields
    pub fn new(
        provider: impl Into<String>,
        domain: impl Into<String>,
        owner: impl Into<String>,
        ip_version: IpVersion,
    ) -> Self {
        Self {
            provider: provider.into(),
            domain: domain.into(),
            owner: owner.into(),
            ip_version,
            ipv6_suffix: None,
            extra: Map::new(),
        }
    }

    /// Add a provider-specific field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Non-empty string field
    pub fn string(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// String field that must be present and non-empty
    pub fn required_string(&self, key: &str) -> Result<String> {
        self.string(key)
            .map(str::to_string)
            .ok_or_else(|| Error::config(format!("{}: {key} is required", self.provider)))
    }

    /// Boolean field, false when absent
    pub fn bool(&self, key: &str) -> Result<bool> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(Error::config(format!(
                "{}: {key} must be a boolean, got {other}",
                self.provider
            ))),
        }
    }

    /// Unsigned integer field, `None` when absent
    pub fn u32(&self, key: &str) -> Result<Option<u32>> {
        match self.extra.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    Error::config(format!(
                        "{}: {key} must be a positive integer, got {value}",
                        self.provider
                    ))
                }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CommonFields {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    domain: String,
    #[serde(default, alias = "host")]
    owner: String,
    #[serde(default)]
    ip_version: String,
    #[serde(default)]
    ipv6_suffix: Option<String>,
    #[serde(default)]
    ip_method: Option<Value>,
    #[serde(default)]
    delay: Option<Value>,
}

/// Parse a settings document into one entry per record.
///
/// `{}` and an empty `settings` array both yield no entries.
pub fn parse_settings(json: &str) -> Result<Vec<ProviderSettings>> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| Error::config(format!("cannot decode settings: {e}")))?;
    let entries = match document.get("settings") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => return Err(Error::config("\"settings\" must be an array")),
    };

    let mut all = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let Value::Object(object) = entry else {
            return Err(Error::config(format!("settings entry {} is not an object", i + 1)));
        };
        let expanded = expand_entry(object)
            .map_err(|e| Error::config(format!("settings entry {}: {e}", i + 1)))?;
        all.extend(expanded);
    }
    Ok(all)
}

/// Read provider settings from `config_json` if set, otherwise from `path`.
///
/// Inline settings are validated then written, indented, to `path`. A
/// missing file is created holding `{}`.
pub async fn load_settings(config_json: Option<&str>, path: &Path) -> Result<Vec<ProviderSettings>> {
    if let Some(json) = config_json {
        tracing::info!("Reading JSON config from environment variable CONFIG");
        let settings = parse_settings(json)?;
        let value: Value = serde_json::from_str(json)?;
        let indented = serde_json::to_string_pretty(&value)?;
        write_private_file(path, indented.as_bytes()).await?;
        return Ok(settings);
    }

    tracing::info!("Reading JSON config from file {}", path.display());
    match tokio::fs::read_to_string(path).await {
        Ok(content) => parse_settings(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("File not found, creating an empty settings file");
            write_private_file(path, b"{}").await?;
            Ok(Vec::new())
        }
        Err(e) => Err(Error::config(format!("cannot read {}: {e}", path.display()))),
    }
}

async fn write_private_file(path: &Path, content: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Error::config(format!("cannot create directory {}: {e}", parent.display()))
        })?;
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(path)
        .await
        .map_err(|e| Error::config(format!("cannot write configuration to file: {e}")))?;
    file.write_all(content)
        .await
        .map_err(|e| Error::config(format!("cannot write configuration to file: {e}")))?;
    file.flush().await?;
    Ok(())
}

fn expand_entry(object: &Map<String, Value>) -> Result<Vec<ProviderSettings>> {
    let mut common: CommonFields = serde_json::from_value(Value::Object(object.clone()))
        .map_err(|e| Error::config(format!("cannot decode common settings: {e}")))?;
    let extra: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !COMMON_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let provider = common.provider.trim().to_lowercase();
    if provider.is_empty() {
        return Err(Error::config("provider is missing"));
    }
    if provider == "google" {
        return Err(Error::config(format!("provider no longer supported: {provider}")));
    }
    if common.ip_method.is_some() {
        tracing::warn!("ip_method is no longer used for {provider}, use PUBLICIP_HTTP_PROVIDERS");
    }
    if common.delay.is_some() {
        tracing::warn!("delay is no longer used for {provider}, use PERIOD");
    }

    let domain = common.domain.trim().to_lowercase();
    if domain.is_empty() && provider != "duckdns" && provider != "goip" {
        return Err(Error::config(format!("domain cannot be blank for provider {provider}")));
    }
    common.owner = common.owner.trim().to_string();

    if provider == "duckdns" && !domain.is_empty() {
        if common.owner.is_empty() {
            let owner = domain.trim_end_matches(".duckdns.org").to_string();
            tracing::warn!(
                "DuckDNS record should have {owner:?} specified as owner instead of {domain:?} as domain"
            );
            common.owner = owner;
        } else {
            tracing::warn!(
                "ignoring domain {domain:?} because owner {:?} is specified for DuckDNS record",
                common.owner
            );
        }
    }

    let ip_version: IpVersion = common.ip_version.parse()?;
    let ipv6_suffix = common
        .ipv6_suffix
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Ipv6Prefix>)
        .transpose()?;
    if ip_version == IpVersion::Ipv4
        && let Some(suffix) = ipv6_suffix
    {
        tracing::warn!("IPv6 suffix specified as {suffix} but IP version is {ip_version}");
    }

    let targets = if provider == "duckdns" {
        owners_of(&common.owner)
            .into_iter()
            .map(|owner| ("duckdns.org".to_string(), owner))
            .collect()
    } else if common.owner.is_empty() {
        split_fqdns(&domain)?
    } else {
        check_domain(&domain)?;
        owners_of(&common.owner)
            .into_iter()
            .map(|owner| (domain.clone(), owner))
            .collect::<Vec<_>>()
    };

    if targets.is_empty() {
        return Err(Error::config(format!("owner cannot be blank for provider {provider}")));
    }

    Ok(targets
        .into_iter()
        .map(|(domain, owner)| ProviderSettings {
            provider: provider.clone(),
            domain,
            owner,
            ip_version,
            ipv6_suffix,
            extra: extra.clone(),
        })
        .collect())
}

fn owners_of(owners: &str) -> Vec<String> {
    owners
        .split(',')
        .map(|owner| owner.trim().to_string())
        .filter(|owner| !owner.is_empty())
        .collect()
}

/// Split comma-separated FQDNs into (root, owner) pairs sharing one root.
fn split_fqdns(domains: &str) -> Result<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for fqdn in domains.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        check_domain(fqdn)?;
        let labels: Vec<&str> = fqdn.split('.').collect();
        let (owner, root) = if labels.len() <= 2 {
            ("@".to_string(), fqdn.to_string())
        } else {
            let cut = labels.len() - 2;
            (labels[..cut].join("."), labels[cut..].join("."))
        };
        if let Some((first_root, _)) = pairs.first()
            && *first_root != root
        {
            return Err(Error::config(format!(
                "domain {fqdn} does not share the root {first_root} of the other domains"
            )));
        }
        pairs.push((root, owner));
    }
    Ok(pairs)
}

fn check_domain(domain: &str) -> Result<()> {
    let valid_label = |label: &str| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*')
    };
    if domain.len() > 253 || !domain.contains('.') || !domain.split('.').all(valid_label) {
        return Err(Error::config(format!("invalid domain {domain:?}")));
    }
    Ok(())
}
