//! Configuration for the DDNS updater
//!
//! Runtime settings come from environment variables and are parsed here from
//! an injected lookup function, so callers (and tests) decide where values
//! come from. Provider settings live in a JSON file, see [`file`].

pub mod duration;
pub mod file;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ipv6::{IPV6_BITS, parse_prefix_length};

pub use duration::{format_duration, parse_duration};
pub use file::{ProviderSettings, load_settings, parse_settings};

/// Minimum resolver timeout accepted
pub const MIN_RESOLVER_TIMEOUT: Duration = Duration::from_millis(10);

/// Which public IP sub-fetchers are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetchers {
    /// HTTP echo services
    pub http: bool,
    /// DNS echo services
    pub dns: bool,
}

impl Default for Fetchers {
    fn default() -> Self {
        Self {
            http: true,
            dns: true,
        }
    }
}

/// Public IP discovery settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIpSettings {
    /// Enabled sub-fetchers
    pub fetchers: Fetchers,
    /// HTTP providers for the mixed (IPv4 or IPv6) lookups
    pub http_providers: Vec<String>,
    /// HTTP providers for IPv4 lookups
    pub ipv4_http_providers: Vec<String>,
    /// HTTP providers for IPv6 lookups
    pub ipv6_http_providers: Vec<String>,
    /// DNS providers
    pub dns_providers: Vec<String>,
    /// Timeout of a single DNS query
    pub dns_timeout: Duration,
}

impl Default for PublicIpSettings {
    fn default() -> Self {
        Self {
            fetchers: Fetchers::default(),
            http_providers: vec!["all".to_string()],
            ipv4_http_providers: vec!["all".to_string()],
            ipv6_http_providers: vec!["all".to_string()],
            dns_providers: vec!["all".to_string()],
            dns_timeout: Duration::from_secs(3),
        }
    }
}

/// Resolver used for authoritative lookups of managed hostnames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Custom upstream; the system configuration is used when unset
    pub address: Option<SocketAddr>,
    /// Query timeout
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            address: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// API and UI server settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Whether the server runs at all
    pub enabled: bool,
    /// Bind address, `:8000` style addresses bind all interfaces
    pub listening_address: String,
    /// Path prefix of every route
    pub root_url: String,
}

/// Periodic backup of the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    /// Zero disables backups
    pub period: Duration,
    /// Where backup directories are created
    pub directory: PathBuf,
}

/// Health server and external pinger settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSettings {
    /// Bind address of the local health server
    pub server_address: String,
    /// healthchecks.io check UUID, empty disables pings
    pub healthchecksio_uuid: String,
    /// healthchecks.io ping base URL
    pub healthchecksio_base_url: String,
}

/// Settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Reconciliation tick interval
    pub period: Duration,
    /// Minimum gap between two successful updates of one record
    pub cooldown: Duration,
    /// Per-request timeout of outbound HTTP calls
    pub http_timeout: Duration,
    /// Public IP discovery
    pub public_ip: PublicIpSettings,
    /// Authoritative lookups
    pub resolver: ResolverSettings,
    /// Prefix length applied to IPv6 addresses before comparison and storage
    pub ipv6_prefix: u8,
    /// Data directory holding `updates.json`
    pub data_dir: PathBuf,
    /// Provider settings file
    pub config_file: PathBuf,
    /// Provider settings given inline, taking priority over the file
    pub config_json: Option<String>,
    /// Backups
    pub backup: BackupSettings,
    /// API and UI server
    pub server: ServerSettings,
    /// Health surfaces
    pub health: HealthSettings,
    /// Log level name
    pub log_level: String,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup
    ///
    /// Empty values are treated as unset. Legacy variable names are honored
    /// with a warning naming their replacement.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let data_dir = PathBuf::from(env.get("DATADIR").unwrap_or_else(|| "./data".into()));
        let config_file = env
            .get("CONFIG_FILEPATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(file::FILE_NAME));

        let settings = Self {
            period: env.period()?,
            cooldown: env.duration("UPDATE_COOLDOWN_PERIOD", Duration::from_secs(300))?,
            http_timeout: env.duration("HTTP_TIMEOUT", Duration::from_secs(20))?,
            public_ip: env.public_ip()?,
            resolver: ResolverSettings {
                address: env
                    .get("RESOLVER_ADDRESS")
                    .map(|address| {
                        address.parse().map_err(|e| {
                            Error::config(format!("RESOLVER_ADDRESS {address:?}: {e}"))
                        })
                    })
                    .transpose()?,
                timeout: env.duration("RESOLVER_TIMEOUT", Duration::from_secs(5))?,
            },
            ipv6_prefix: env
                .get("IPV6_PREFIX")
                .map(|s| parse_prefix_length(&s))
                .transpose()?
                .unwrap_or(IPV6_BITS),
            backup: BackupSettings {
                period: env.duration("BACKUP_PERIOD", Duration::ZERO)?,
                directory: env
                    .get("BACKUP_DIRECTORY")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.clone()),
            },
            data_dir,
            config_file,
            config_json: env.get("CONFIG"),
            server: env.server()?,
            health: HealthSettings {
                server_address: env
                    .get("HEALTH_SERVER_ADDRESS")
                    .unwrap_or_else(|| "127.0.0.1:9999".into()),
                healthchecksio_uuid: env.get("HEALTHCHECKS_IO_UUID").unwrap_or_default(),
                healthchecksio_base_url: env
                    .get("HEALTHCHECKS_IO_BASE_URL")
                    .unwrap_or_else(|| "https://hc-ping.com".into()),
            },
            log_level: env.get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::config("PERIOD must be greater than 0"));
        }
        if self.http_timeout.is_zero() {
            return Err(Error::config("HTTP_TIMEOUT must be greater than 0"));
        }
        if self.resolver.timeout < MIN_RESOLVER_TIMEOUT {
            return Err(Error::config(format!(
                "RESOLVER_TIMEOUT {} must be at least {}",
                format_duration(self.resolver.timeout),
                format_duration(MIN_RESOLVER_TIMEOUT)
            )));
        }
        if !self.public_ip.fetchers.http && !self.public_ip.fetchers.dns {
            return Err(Error::config("PUBLICIP_FETCHERS enables no fetcher"));
        }
        if self.public_ip.dns_timeout.is_zero() {
            return Err(Error::config("PUBLICIP_DNS_TIMEOUT must be greater than 0"));
        }
        if !self.server.root_url.starts_with('/') {
            return Err(Error::config(format!(
                "ROOT_URL {:?} must start with /",
                self.server.root_url
            )));
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::config(format!(
                    "LOG_LEVEL {other:?} is not one of trace, debug, info, warn, error"
                )));
            }
        }
        Ok(())
    }

    /// Log lines describing the effective settings, credentials excluded
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Period: {}", format_duration(self.period)),
            format!("Cooldown: {}", format_duration(self.cooldown)),
            format!("HTTP timeout: {}", format_duration(self.http_timeout)),
            format!(
                "Public IP fetchers: http={} dns={}",
                self.public_ip.fetchers.http, self.public_ip.fetchers.dns
            ),
            format!("IPv6 prefix: /{}", self.ipv6_prefix),
            format!("Data directory: {}", self.data_dir.display()),
            format!("Config file: {}", self.config_file.display()),
        ];
        match self.resolver.address {
            Some(address) => lines.push(format!(
                "Resolver: {address} (timeout {})",
                format_duration(self.resolver.timeout)
            )),
            None => lines.push("Resolver: system".to_string()),
        }
        if self.server.enabled {
            lines.push(format!(
                "Server: {} at {}",
                self.server.listening_address, self.server.root_url
            ));
        } else {
            lines.push("Server: disabled".to_string());
        }
        if self.backup.period.is_zero() {
            lines.push("Backup: disabled".to_string());
        } else {
            lines.push(format!(
                "Backup: every {} to {}",
                format_duration(self.backup.period),
                self.backup.directory.display()
            ));
        }
        lines
    }
}

/// Thin wrapper over the lookup function with legacy-name handling.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Value of `key`, falling back to legacy names with a warning.
    fn get_with_retro(&self, key: &str, retro_keys: &[&str]) -> Option<String> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        retro_keys.iter().find_map(|retro| {
            let value = self.get(retro)?;
            tracing::warn!("{retro} is deprecated, please use {key} instead");
            Some(value)
        })
    }

    fn duration(&self, key: &str, default: Duration) -> Result<Duration> {
        match self.get(key) {
            Some(value) => {
                parse_duration(&value).map_err(|e| Error::config(format!("{key}: {e}")))
            }
            None => Ok(default),
        }
    }

    fn csv(&self, key: &str, retro_keys: &[&str]) -> Option<Vec<String>> {
        self.get_with_retro(key, retro_keys).map(|value| {
            value
                .split(',')
                .map(|field| field.trim().to_lowercase())
                .filter(|field| !field.is_empty())
                .collect()
        })
    }

    fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "yes" | "true" | "on" | "1" => Ok(true),
                "no" | "false" | "off" | "0" => Ok(false),
                _ => Err(Error::config(format!("{key}: {v:?} is not a boolean"))),
            },
        }
    }

    /// `PERIOD`, with `UPDATE_PERIOD` and `DELAY` (integer seconds) as legacy names.
    fn period(&self) -> Result<Duration> {
        if let Some(value) = self.get("PERIOD") {
            return parse_duration(&value).map_err(|e| Error::config(format!("PERIOD: {e}")));
        }
        if let Some(value) = self.get("UPDATE_PERIOD") {
            tracing::warn!("UPDATE_PERIOD is deprecated, please use PERIOD instead");
            return parse_duration(&value)
                .map_err(|e| Error::config(format!("UPDATE_PERIOD: {e}")));
        }
        if let Some(value) = self.get("DELAY") {
            tracing::warn!("DELAY is deprecated, please use PERIOD instead");
            if let Ok(secs) = value.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            return parse_duration(&value).map_err(|e| Error::config(format!("DELAY: {e}")));
        }
        Ok(Duration::from_secs(600))
    }

    fn public_ip(&self) -> Result<PublicIpSettings> {
        let defaults = PublicIpSettings::default();
        let providers = |key: &str, retro: &[&str], default: Vec<String>| {
            self.csv(key, retro)
                .map(|names| retro_http_providers(&names))
                .unwrap_or(default)
        };

        Ok(PublicIpSettings {
            fetchers: match self.csv("PUBLICIP_FETCHERS", &[]) {
                Some(fields) => parse_fetchers(&fields)?,
                None => defaults.fetchers,
            },
            http_providers: providers(
                "PUBLICIP_HTTP_PROVIDERS",
                &["IP_METHOD"],
                defaults.http_providers,
            ),
            ipv4_http_providers: providers(
                "PUBLICIPV4_HTTP_PROVIDERS",
                &["IPV4_METHOD"],
                defaults.ipv4_http_providers,
            ),
            ipv6_http_providers: providers(
                "PUBLICIPV6_HTTP_PROVIDERS",
                &["IPV6_METHOD"],
                defaults.ipv6_http_providers,
            ),
            dns_providers: self
                .csv("PUBLICIP_DNS_PROVIDERS", &[])
                .unwrap_or(defaults.dns_providers),
            dns_timeout: self.duration("PUBLICIP_DNS_TIMEOUT", defaults.dns_timeout)?,
        })
    }

    fn server(&self) -> Result<ServerSettings> {
        let listening_address = match self.get("LISTENING_ADDRESS") {
            Some(address) => address,
            None => match self.get("LISTENING_PORT") {
                Some(port) => {
                    tracing::warn!(
                        "LISTENING_PORT is deprecated, please use LISTENING_ADDRESS instead"
                    );
                    let port: u16 = port
                        .parse()
                        .map_err(|e| Error::config(format!("LISTENING_PORT {port:?}: {e}")))?;
                    format!(":{port}")
                }
                None => ":8000".to_string(),
            },
        };
        Ok(ServerSettings {
            enabled: self.bool("SERVER_ENABLED", true)?,
            listening_address,
            root_url: self.get("ROOT_URL").unwrap_or_else(|| "/".into()),
        })
    }
}

fn parse_fetchers(fields: &[String]) -> Result<Fetchers> {
    let mut fetchers = Fetchers {
        http: false,
        dns: false,
    };
    for (i, field) in fields.iter().enumerate() {
        match field.as_str() {
            "all" => {
                fetchers.http = true;
                fetchers.dns = true;
            }
            "cycle" => {
                tracing::warn!("public IP fetcher \"cycle\" is deprecated, please use \"all\"");
                fetchers.http = true;
                fetchers.dns = true;
            }
            "http" => fetchers.http = true,
            "dns" => fetchers.dns = true,
            other => {
                return Err(Error::config(format!(
                    "invalid fetcher specified: {other:?} at position {} of {}",
                    i + 1,
                    fields.len()
                )));
            }
        }
    }
    Ok(fetchers)
}

/// Rewrite legacy HTTP provider names, dropping the ones without a replacement.
fn retro_http_providers(names: &[String]) -> Vec<String> {
    let renames: HashMap<&str, &str> = HashMap::from([("ipify6", "ipify"), ("cycle", "all")]);
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if let Some(new_name) = renames.get(name.as_str()) {
            tracing::warn!("public IP provider {name:?} is deprecated, please use {new_name:?}");
            out.push((*new_name).to_string());
            continue;
        }
        match name.as_str() {
            "noip4" | "noip6" | "noip8245_4" | "noip8245_6" | "opendns" => {
                tracing::warn!("public IP provider {name:?} no longer exists and is ignored");
            }
            _ => out.push(name.clone()),
        }
    }
    if out.is_empty() {
        out.push("all".to_string());
    }
    out
}
