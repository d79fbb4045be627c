//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that shutdown is deterministic and complete.
//!
//! Constraints verified:
//! - Stopping the updater cancels an in-flight provider call
//! - Force requesters get a cancellation instead of hanging
//! - The update task exits before `stop` returns
//! - The history store is closed last
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Network calls that ignore cancellation
//! - Blocking operations in shutdown path

mod common;

use async_trait::async_trait;
use common::*;
use ddns_core::error::Result;
use ddns_core::lifecycle::{Sequence, Service};
use ddns_core::models::{History, IpVersion, Record, Status};
use ddns_core::persistence::MemoryHistoryStore;
use ddns_core::records::RecordStore;
use ddns_core::traits::Provider;
use ddns_core::{DdnsEngine, EngineConfig};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A provider whose update never completes
struct HangingProvider {
    entered: Arc<AtomicBool>,
}

#[async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
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

    async fn update(&self, _client: &reqwest::Client, _ip: IpAddr) -> Result<IpAddr> {
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending().await
    }
}

fn engine_with(provider: Arc<dyn Provider>) -> (DdnsEngine, Arc<RecordStore>, MockFetcher) {
    let records = Arc::new(RecordStore::new(
        vec![Record::new(provider, History::default())],
        Arc::new(MemoryHistoryStore::new()),
    ));
    let fetcher = MockFetcher::new();
    fetcher.set_ipv4(Some(ip("203.0.113.5")));
    let engine = DdnsEngine::new(
        manual_config(),
        Arc::clone(&records),
        Arc::new(fetcher.clone()),
        Arc::new(MockResolver::answering(Vec::new())),
        reqwest::Client::new(),
    );
    (engine, records, fetcher)
}

#[tokio::test]
async fn stop_cancels_in_flight_update() {
    let entered = Arc::new(AtomicBool::new(false));
    let (mut engine, records, _fetcher) = engine_with(Arc::new(HangingProvider {
        entered: Arc::clone(&entered),
    }));
    let force = engine.force_handle();
    engine.start().await.unwrap();

    let forced = tokio::spawn(async move { force.force_update().await });
    for _ in 0..100 {
        if entered.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(entered.load(Ordering::SeqCst), "provider update never started");

    tokio::time::timeout(Duration::from_secs(5), engine.stop())
        .await
        .expect("Engine should stop within 5 seconds")
        .unwrap();

    let errors = forced.await.unwrap();
    assert!(errors.iter().any(|e| e.is_cancelled()), "{errors:?}");

    let record = records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Fail);
    assert!(record.history.is_empty());
}

#[tokio::test]
async fn force_after_stop_is_cancelled() {
    let (mut engine, _records, fetcher) =
        engine_with(Arc::new(MockProvider::new("@", IpVersion::Ipv4)));
    let force = engine.force_handle();
    engine.start().await.unwrap();
    engine.stop().await.unwrap();

    let errors = force.force_update().await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_cancelled());
    assert_eq!(fetcher.ip4_call_count(), 0);
}

#[tokio::test]
async fn sequence_stops_updater_before_database() {
    let history = MemoryHistoryStore::new();
    let records = Arc::new(RecordStore::new(Vec::new(), Arc::new(history)));
    let engine = DdnsEngine::new(
        EngineConfig::default(),
        Arc::clone(&records),
        Arc::new(MockFetcher::new()),
        Arc::new(MockResolver::default()),
        reqwest::Client::new(),
    );
    let force = engine.force_handle();

    let mut sequence = Sequence::new(
        "ddns",
        vec![Box::new(records.service()), Box::new(engine)],
        &["updater", "database"],
    )
    .unwrap();

    let _run_error = sequence.start().await.unwrap();
    assert!(force.force_update().await.is_empty());

    tokio::time::timeout(Duration::from_secs(5), sequence.stop())
        .await
        .expect("Sequence should stop within 5 seconds")
        .unwrap();
    assert!(force.force_update().await[0].is_cancelled());
}
