//! Authoritative lookups of managed hostnames
//!
//! Backed by hickory. Uses the system configuration unless a custom
//! upstream is configured, in which case only that server is queried over
//! UDP.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{TokioResolver, system_conf};
use std::net::IpAddr;

use crate::config::{MIN_RESOLVER_TIMEOUT, ResolverSettings};
use crate::error::{Error, Result};
use crate::traits::LookupIp;

/// Resolver for the "should I update?" and health lookups.
pub struct HickoryLookup {
    resolver: TokioResolver,
}

impl HickoryLookup {
    /// Create a resolver from the settings
    pub fn new(settings: &ResolverSettings) -> Result<Self> {
        if settings.timeout < MIN_RESOLVER_TIMEOUT {
            return Err(Error::config(format!(
                "resolver timeout {:?} is below {:?}",
                settings.timeout, MIN_RESOLVER_TIMEOUT
            )));
        }

        let config = match settings.address {
            Some(address) => {
                let mut custom = ResolverConfig::new();
                custom.add_name_server(NameServerConfig::new(address, Protocol::Udp));
                custom
            }
            None => match system_conf::read_system_conf() {
                Ok((system, _)) if !system.name_servers().is_empty() => system,
                Ok(_) => {
                    tracing::warn!("No system DNS servers found, falling back to Cloudflare DNS");
                    ResolverConfig::cloudflare()
                }
                Err(e) => {
                    tracing::warn!(
                        "Cannot read system DNS configuration ({}), falling back to Cloudflare DNS",
                        e
                    );
                    ResolverConfig::cloudflare()
                }
            },
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = settings.timeout;
        // Cached answers would hide a record that was just changed
        opts.cache_size = 0;

        let resolver =
            hickory_resolver::Resolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl LookupIp for HickoryLookup {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| Error::resolver(format!("looking up {host}: {e}")))?;
        Ok(lookup.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn rejects_short_timeouts() {
        let settings = ResolverSettings {
            address: Some("127.0.0.1:53".parse().unwrap()),
            timeout: Duration::from_millis(5),
        };
        assert!(HickoryLookup::new(&settings).is_err());
    }

    #[tokio::test]
    async fn builds_with_custom_upstream() {
        let settings = ResolverSettings {
            address: Some("127.0.0.1:53".parse().unwrap()),
            timeout: Duration::from_millis(10),
        };
        assert!(HickoryLookup::new(&settings).is_ok());
    }
}
