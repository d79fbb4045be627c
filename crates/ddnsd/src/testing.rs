//! Test doubles shared by the daemon's unit tests

use async_trait::async_trait;
use ddns_core::models::{History, IpVersion, Record};
use ddns_core::persistence::MemoryHistoryStore;
use ddns_core::traits::{LookupIp, Provider, PublicIpFetcher};
use ddns_core::{DdnsEngine, EngineConfig, Error, ForceHandle, RecordStore, Result};
use std::net::IpAddr;
use std::sync::Arc;

/// IPv4 record of `example.com` whose updates always succeed
pub struct StaticProvider {
    owner: String,
}

impl StaticProvider {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
        }
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn domain(&self) -> &str {
        "example.com"
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn ip_version(&self) -> IpVersion {
        IpVersion::Ipv4
    }

    async fn update(&self, _client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        Ok(ip)
    }
}

/// Resolver answering every host with the same addresses
pub struct Answers(pub Vec<IpAddr>);

#[async_trait]
impl LookupIp for Answers {
    async fn lookup_ip(&self, _host: &str) -> Result<Vec<IpAddr>> {
        Ok(self.0.clone())
    }
}

struct NoPublicIp;

#[async_trait]
impl PublicIpFetcher for NoPublicIp {
    async fn ip(&self) -> Result<IpAddr> {
        Err(Error::public_ip("offline"))
    }

    async fn ip4(&self) -> Result<IpAddr> {
        Err(Error::public_ip("offline"))
    }

    async fn ip6(&self) -> Result<IpAddr> {
        Err(Error::public_ip("offline"))
    }
}

/// Unset records for `providers`, and a force handle of an engine that
/// already went away
pub fn records_with(providers: Vec<StaticProvider>) -> (Arc<RecordStore>, ForceHandle) {
    let records = providers
        .into_iter()
        .map(|p| Record::new(Arc::new(p), History::default()))
        .collect();
    let records = Arc::new(RecordStore::new(records, Arc::new(MemoryHistoryStore::new())));
    let engine = DdnsEngine::new(
        EngineConfig::default(),
        Arc::clone(&records),
        Arc::new(NoPublicIp),
        Arc::new(Answers(Vec::new())),
        reqwest::Client::new(),
    );
    (records, engine.force_handle())
}
