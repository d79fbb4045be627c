// # Public IP Fetcher Trait
//
// Defines how the engine discovers the public IP address(es) of the host.
//
// ## Implementations
//
// - HTTP echo services: `ddns-ip-http` crate
// - DNS echo queries: `ddns-ip-dns` crate
// - Alternation between several fetchers: `ddns_core::publicip::CyclingFetcher`
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::PublicIpFetcher;
//
// async fn show(fetcher: &dyn PublicIpFetcher) -> ddns_core::Result<()> {
//     println!("mixed: {}", fetcher.ip().await?);
//     println!("ipv4: {}", fetcher.ip4().await?);
//     println!("ipv6: {}", fetcher.ip6().await?);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::IpAddr;

/// Source of the host's public IP address(es).
///
/// Each call may go to a different upstream (implementations cycle through
/// their configured providers), so callers retry by calling again rather
/// than expecting the implementation to retry.
#[async_trait]
pub trait PublicIpFetcher: Send + Sync {
    /// Public IP of either family, whichever the upstream answers with
    async fn ip(&self) -> crate::Result<IpAddr>;

    /// Public IPv4 address
    async fn ip4(&self) -> crate::Result<IpAddr>;

    /// Public IPv6 address
    async fn ip6(&self) -> crate::Result<IpAddr>;
}
