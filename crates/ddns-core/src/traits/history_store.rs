// # History Store Trait
//
// Defines the interface for persisting the IP history of each record.
//
// ## Purpose
//
// The history store survives restarts so that cooldown and comparisons have
// a baseline from the first tick. Records are keyed by
// (domain, owner, ip version).
//
// ## Implementations
//
// - JSON document on disk: `JsonHistoryStore` (`updates.json`)
// - In memory: `MemoryHistoryStore`
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::HistoryStore;
// use ddns_core::models::IpVersion;
//
// async fn record(store: &dyn HistoryStore) -> ddns_core::Result<()> {
//     let ip = std::net::IpAddr::from([203, 0, 113, 5]);
//     store
//         .store_new_ip("example.com", "@", IpVersion::Ipv4, ip, chrono::Utc::now())
//         .await?;
//     let history = store.get_events("example.com", "@", IpVersion::Ipv4).await?;
//     assert_eq!(history.current_ip(), Some(ip));
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::models::{History, IpVersion};

/// Persistent, append-only IP history per record.
///
/// Implementations serialize writes; a write must be durable when
/// `store_new_ip` returns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// History of the record, empty when it was never stored
    async fn get_events(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
    ) -> crate::Result<History>;

    /// Append one event to the record, creating the record if needed
    async fn store_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
        ip: IpAddr,
        time: DateTime<Utc>,
    ) -> crate::Result<()>;

    /// Wait for any in-flight write; idempotent
    async fn close(&self) -> crate::Result<()>;
}
