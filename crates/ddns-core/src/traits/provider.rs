// # Provider Trait
//
// Defines the interface every DNS service driver implements.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
// - DuckDNS: `ddns-provider-duckdns` crate
// - No-IP: `ddns-provider-noip` crate
// - Custom HTTP GET: `ddns-provider-custom` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::Provider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* Provider implementation */;
//     let client = reqwest::Client::new();
//
//     let new_ip = provider
//         .update(&client, std::net::IpAddr::from([203, 0, 113, 5]))
//         .await?;
//     println!("{} now points to {}", provider.build_domain_name(), new_ip);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::ProviderSettings;
use crate::ipv6::Ipv6Prefix;
use crate::models::IpVersion;
use crate::provider::utils;

/// A DNS service driver bound to one record (domain, owner, IP version).
///
/// Drivers own their credentials and their request building. They must not
/// retry, sleep or spawn tasks: the engine decides when to call `update`
/// again (next tick, after cooldown or ban).
///
/// # Errors
///
/// Drivers classify failures with the shared error enum so the engine can
/// tell a ban apart from a transient failure:
///
/// - `Error::Banned`, `Error::Authentication`, `Error::RateLimited` freeze
///   the record for an hour
/// - anything else marks the record failed until the next tick
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name as written in the settings file (e.g. "cloudflare")
    fn name(&self) -> &str;

    /// Registered domain, e.g. `example.com`
    fn domain(&self) -> &str;

    /// Left-most label(s): `@` for the apex, `*` for a wildcard
    fn owner(&self) -> &str;

    /// IP version this record tracks
    fn ip_version(&self) -> IpVersion;

    /// Whether a CDN sits in front of the record, making lookups meaningless
    fn proxied(&self) -> bool {
        false
    }

    /// Interface suffix to graft on the public IPv6 prefix, if configured
    fn ipv6_suffix(&self) -> Option<Ipv6Prefix> {
        None
    }

    /// Fully qualified name used for lookups and logs
    fn build_domain_name(&self) -> String {
        utils::build_domain_name(self.owner(), self.domain())
    }

    /// Home page of the DNS service, shown in the status page
    fn home_url(&self) -> Option<&str> {
        None
    }

    /// Point the record to `ip`.
    ///
    /// Returns the IP address the service reports for the record afterwards,
    /// which is normally `ip` itself.
    async fn update(&self, client: &reqwest::Client, ip: IpAddr) -> crate::Result<IpAddr>;
}

/// Short description used in logs and record listings.
pub fn describe(provider: &dyn Provider) -> String {
    format!(
        "[domain: {} | owner: {} | provider: {} | ip: {}]",
        provider.domain(),
        provider.owner(),
        provider.name(),
        provider.ip_version()
    )
}

/// Helper trait for constructing providers from the settings file
pub trait ProviderFactory: Send + Sync {
    /// Create a provider from one expanded settings entry
    ///
    /// # Parameters
    ///
    /// - `settings`: common fields plus the provider-specific JSON fields
    ///
    /// # Returns
    ///
    /// A shared provider trait object
    fn create(&self, settings: &ProviderSettings) -> crate::Result<Arc<dyn Provider>>;
}
