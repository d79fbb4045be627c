//! Core traits for the DDNS updater
//!
//! These traits are the seams between the engine and its collaborators.
//! Provider drivers and public IP fetchers live in their own crates and
//! only depend on these definitions.

pub mod history_store;
pub mod lookup;
pub mod provider;
pub mod public_ip;

pub use history_store::HistoryStore;
pub use lookup::LookupIp;
pub use provider::{Provider, ProviderFactory};
pub use public_ip::PublicIpFetcher;
