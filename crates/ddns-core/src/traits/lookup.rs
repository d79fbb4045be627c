//! Hostname resolution seam used by the engine and the health predicate.

use async_trait::async_trait;
use std::net::IpAddr;

/// Resolves a hostname to all its A and AAAA addresses.
#[async_trait]
pub trait LookupIp: Send + Sync {
    /// Resolve `host`, returning every IPv4 and IPv6 address found
    async fn lookup_ip(&self, host: &str) -> crate::Result<Vec<IpAddr>>;
}
