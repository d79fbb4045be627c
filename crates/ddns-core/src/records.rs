//! In-memory record store
//!
//! Records are indexed by their position at startup and guarded by a
//! reader/writer lock. New history events are mirrored to the persistent
//! [`HistoryStore`] before the write lock is released.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

use crate::error::{Error, Result};
use crate::lifecycle::Service;
use crate::models::Record;
use crate::traits::{HistoryStore, Provider};

/// Records owned by the process, shared between the engine and the servers.
pub struct RecordStore {
    records: RwLock<Vec<Record>>,
    history: Arc<dyn HistoryStore>,
}

impl RecordStore {
    /// Create a store from ready records
    pub fn new(records: Vec<Record>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            records: RwLock::new(records),
            history,
        }
    }

    /// Build one unset record per driver, with its persisted history
    pub async fn load(
        providers: Vec<Arc<dyn Provider>>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<Self> {
        let mut records = Vec::with_capacity(providers.len());
        for provider in providers {
            let events = history
                .get_events(provider.domain(), provider.owner(), provider.ip_version())
                .await?;
            records.push(Record::new(provider, events));
        }
        Ok(Self::new(records, history))
    }

    /// Copy of the record at `id`
    pub async fn select(&self, id: usize) -> Result<Record> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("record {id}")))
    }

    /// Copies of all records, in id order
    pub async fn select_all(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no record
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Replace the record at `id`.
    ///
    /// The history may only grow by one event at a time, and that event may
    /// not go back in time. When it grew, the new event is written to the
    /// history store; a write error is returned after the in-memory record
    /// was replaced.
    pub async fn update(&self, id: usize, record: Record) -> Result<()> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;

        let (old_len, new_len) = (current.history.len(), record.history.len());
        if new_len < old_len {
            return Err(Error::invalid_input(format!(
                "history of record {id} cannot shrink from {old_len} to {new_len} events"
            )));
        }
        if new_len > old_len + 1 {
            return Err(Error::invalid_input(format!(
                "history of record {id} can only grow by one event, got {}",
                new_len - old_len
            )));
        }
        let appended = (new_len > old_len)
            .then(|| record.history.last().cloned())
            .flatten();
        if let (Some(event), Some(previous)) = (&appended, current.history.last())
            && event.time < previous.time
        {
            return Err(Error::invalid_input(format!(
                "new event of record {id} at {} is older than {}",
                event.time, previous.time
            )));
        }

        let provider = Arc::clone(&record.provider);
        *current = record;

        if let Some(event) = appended {
            self.history
                .store_new_ip(
                    provider.domain(),
                    provider.owner(),
                    provider.ip_version(),
                    event.ip,
                    event.time,
                )
                .await?;
        }
        Ok(())
    }

    /// Lifecycle handle closing the history store on stop
    pub fn service(self: &Arc<Self>) -> RecordStoreService {
        RecordStoreService {
            store: Arc::clone(self),
        }
    }
}

/// The record store as a lifecycle service named "database".
pub struct RecordStoreService {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Service for RecordStoreService {
    fn name(&self) -> &str {
        "database"
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        Ok(None)
    }

    async fn stop(&mut self) -> Result<()> {
        self.store.history.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{History, HistoryEvent, IpVersion};
    use crate::persistence::MemoryHistoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::net::IpAddr;
    use tokio_test::{assert_err, assert_ok};

    struct Fixed;

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn domain(&self) -> &str {
            "example.com"
        }
        fn owner(&self) -> &str {
            "@"
        }
        fn ip_version(&self) -> IpVersion {
            IpVersion::Ipv4
        }
        async fn update(&self, _client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
            Ok(ip)
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn store_with(history: &MemoryHistoryStore) -> RecordStore {
        RecordStore::load(vec![Arc::new(Fixed)], Arc::new(history.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn appended_event_is_mirrored() {
        let history = MemoryHistoryStore::new();
        let store = store_with(&history).await;

        let mut record = store.select(0).await.unwrap();
        record
            .history
            .push(HistoryEvent::new(IpAddr::from([203, 0, 113, 5]), at(0)));
        assert_ok!(store.update(0, record.clone()).await);
        assert_eq!(history.write_count(), 1);

        // Same history length: nothing to persist
        record.message = "no IP change".to_string();
        store.update(0, record).await.unwrap();
        assert_eq!(history.write_count(), 1);

        let reloaded = store_with(&history).await;
        let record = reloaded.select(0).await.unwrap();
        assert_eq!(record.history.current_ip(), Some(IpAddr::from([203, 0, 113, 5])));
    }

    #[tokio::test]
    async fn history_cannot_shrink_or_jump() {
        let history = MemoryHistoryStore::new();
        let store = store_with(&history).await;

        let mut record = store.select(0).await.unwrap();
        record
            .history
            .push(HistoryEvent::new(IpAddr::from([203, 0, 113, 5]), at(10)));
        assert_ok!(store.update(0, record.clone()).await);

        let mut shrunk = record.clone();
        shrunk.history = History::default();
        assert_err!(store.update(0, shrunk).await);

        let mut jumped = record.clone();
        jumped
            .history
            .push(HistoryEvent::new(IpAddr::from([203, 0, 113, 6]), at(20)));
        jumped
            .history
            .push(HistoryEvent::new(IpAddr::from([203, 0, 113, 7]), at(30)));
        assert_err!(store.update(0, jumped).await);

        let mut older = record;
        older
            .history
            .push(HistoryEvent::new(IpAddr::from([203, 0, 113, 6]), at(0)));
        assert_err!(store.update(0, older).await);

        assert_eq!(history.write_count(), 1);
    }

    #[tokio::test]
    async fn unknown_ids() {
        let history = MemoryHistoryStore::new();
        let store = store_with(&history).await;
        assert!(store.select(1).await.is_err());
        let record = store.select(0).await.unwrap();
        assert_err!(store.update(3, record).await);
    }
}
