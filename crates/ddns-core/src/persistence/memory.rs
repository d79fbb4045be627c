// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// ## Purpose
//
// Keeps histories for the lifetime of the process only. Useful for tests and
// for running without a writable data directory: after a restart every
// record starts with an empty history and gets a fresh baseline on the
// first tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::PersistentDocument;
use crate::error::{Error, Result};
use crate::models::{History, IpVersion};
use crate::traits::HistoryStore;

/// In-memory history store.
///
/// Clones share the same underlying document, so a test can keep a handle
/// and inspect what the record store mirrored into it.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    document: Arc<RwLock<PersistentDocument>>,
    writes: Arc<AtomicUsize>,
    refused: Arc<AtomicUsize>,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with an existing document
    pub fn with_document(document: PersistentDocument) -> Self {
        Self {
            document: Arc::new(RwLock::new(document)),
            writes: Arc::new(AtomicUsize::new(0)),
            refused: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` writes fail, leaving the document untouched
    pub fn refuse_next_writes(&self, count: usize) {
        self.refused.store(count, Ordering::SeqCst);
    }

    /// Number of `store_new_ip` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of the current document
    pub async fn document(&self) -> PersistentDocument {
        self.document.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_events(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
    ) -> Result<History> {
        Ok(self.document.read().await.history(domain, owner, ip_version))
    }

    async fn store_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
        ip: IpAddr,
        time: DateTime<Utc>,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self
            .refused
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::persistence(format!(
                "writing {owner}.{domain}: write refused"
            )));
        }
        self.document
            .write()
            .await
            .append(domain, owner, ip_version, ip, time);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryHistoryStore::new();
        let handle = store.clone();

        store
            .store_new_ip(
                "example.com",
                "@",
                IpVersion::Ipv4,
                IpAddr::from([203, 0, 113, 5]),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(handle.write_count(), 1);
        assert_eq!(handle.document().await.records.len(), 1);
    }

    #[tokio::test]
    async fn refused_writes_leave_document_untouched() {
        let store = MemoryHistoryStore::new();
        store.refuse_next_writes(1);
        let ip = IpAddr::from([203, 0, 113, 5]);

        let err = store
            .store_new_ip("example.com", "@", IpVersion::Ipv4, ip, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "persistence error: writing @.example.com: write refused"
        );
        assert!(store.document().await.records.is_empty());

        store
            .store_new_ip("example.com", "@", IpVersion::Ipv4, ip, Utc::now())
            .await
            .unwrap();
        assert_eq!(store.document().await.records.len(), 1);
        assert_eq!(store.write_count(), 2);
    }
}
