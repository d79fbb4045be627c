// # ddns-core
//
// Core library of the DDNS updater.
//
// ## Architecture Overview
//
// - **Provider**: trait every DNS service driver implements
// - **PublicIpFetcher**: trait for discovering the public IPv4/IPv6 addresses
// - **LookupIp**: trait for resolving managed hostnames
// - **HistoryStore**: trait for the persisted per-record IP history
// - **RecordStore**: the records in memory, shared by the engine and servers
// - **DdnsEngine**: periodic and forced reconciliation of records
// - **ProviderRegistry**: provider name → factory, filled by driver crates
// - **lifecycle**: ordered start/stop of the long-lived services
//
// ## Design Principles
//
// 1. **Core first**: drivers and fetchers depend on this crate, never the reverse
// 2. **Registry based**: providers are looked up by name, no hard-coded dispatch
// 3. **Single writer**: only the engine updates records; servers read copies
// 4. **Append only**: history events are only ever appended and persisted

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod healthchecksio;
pub mod ipv6;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod provider;
pub mod publicip;
pub mod records;
pub mod registry;
pub mod resolver;
pub mod traits;

// Re-export core types for convenience
pub use config::{ProviderSettings, Settings};
pub use engine::{DdnsEngine, EngineConfig, ForceHandle};
pub use error::{Error, Result};
pub use models::{History, HistoryEvent, IpVersion, Record, Status};
pub use records::RecordStore;
pub use registry::ProviderRegistry;
pub use traits::{HistoryStore, LookupIp, Provider, ProviderFactory, PublicIpFetcher};
