//! Contract Test: End-to-End Update Scenarios
//!
//! Each test drives one full reconciliation through the engine with mock
//! collaborators and checks the record status, the history and the number
//! of persisted writes.
//!
//! If this test fails, the fetch → decide → apply pipeline is broken.

mod common;

use common::*;
use ddns_core::lifecycle::Service;
use ddns_core::models::{History, IpVersion, Status};
use ddns_core::EngineConfig;
use std::time::Duration;

#[tokio::test]
async fn first_tick_success() {
    let provider = MockProvider::new("home", IpVersion::Ipv4);
    let h = harness(
        vec![(MockProvider::sharing_counters_with(&provider), History::default())],
        manual_config(),
    )
    .await;
    h.fetcher.set_ipv4(Some(ip("203.0.113.5")));
    h.resolver.set_answer(Some(Vec::new()));

    let errors = h.engine.reconcile_once().await;
    assert!(errors.is_empty(), "{errors:?}");

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.message, "changed to 203.0.113.5");
    assert_eq!(record.time, Some(t0()));
    assert_eq!(record.history.events().len(), 1);
    assert_eq!(record.history.current_ip(), Some(ip("203.0.113.5")));
    assert_eq!(record.history.last().unwrap().time, t0());
    assert_eq!(h.history.write_count(), 1);
    assert_eq!(provider.requested(), vec![ip("203.0.113.5")]);
}

#[tokio::test]
async fn no_op_when_up_to_date() {
    let provider = MockProvider::new("home", IpVersion::Ipv4);
    let h = harness(
        vec![(
            MockProvider::sharing_counters_with(&provider),
            history_of(ip("203.0.113.5"), t0()),
        )],
        manual_config(),
    )
    .await;
    let writes = h.history.write_count();
    h.clock.advance(Duration::from_secs(3600));
    h.fetcher.set_ipv4(Some(ip("203.0.113.5")));
    h.resolver.set_answer(Some(vec![ip("203.0.113.5")]));

    assert!(h.engine.reconcile_once().await.is_empty());

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::UpToDate);
    assert_eq!(record.history.len(), 1);
    assert_eq!(provider.update_call_count(), 0);
    assert_eq!(h.history.write_count(), writes);
}

#[tokio::test]
async fn drift_triggers_update() {
    let provider = MockProvider::new("home", IpVersion::Ipv4);
    let h = harness(
        vec![(
            MockProvider::sharing_counters_with(&provider),
            history_of(ip("203.0.113.5"), t0()),
        )],
        manual_config(),
    )
    .await;
    let writes = h.history.write_count();
    h.clock.advance(Duration::from_secs(3600));
    let t1 = h.clock.now();
    h.fetcher.set_ipv4(Some(ip("203.0.113.9")));
    h.resolver.set_answer(Some(vec![ip("203.0.113.5")]));

    assert!(h.engine.reconcile_once().await.is_empty());

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Success);
    let events: Vec<_> = record.history.events().iter().map(|e| (e.ip, e.time)).collect();
    assert_eq!(
        events,
        vec![(ip("203.0.113.5"), t0()), (ip("203.0.113.9"), t1)]
    );
    assert_eq!(h.history.write_count(), writes + 1);
    assert_eq!(
        h.notifier.messages(),
        vec!["home.example.com changed to 203.0.113.9".to_string()]
    );

    let persisted = h.history.document().await;
    let persisted = persisted.history("example.com", "home", IpVersion::Ipv4);
    assert_eq!(persisted.current_ip(), Some(ip("203.0.113.9")));
}

#[tokio::test]
async fn ban_freezes_record_for_an_hour() {
    let provider = MockProvider::new("home", IpVersion::Ipv4);
    provider.set_reply(Reply::Banned);
    let h = harness(
        vec![(
            MockProvider::sharing_counters_with(&provider),
            history_of(ip("203.0.113.5"), t0()),
        )],
        manual_config(),
    )
    .await;
    h.clock.advance(Duration::from_secs(3600));
    let banned_at = h.clock.now();
    h.fetcher.set_ipv4(Some(ip("203.0.113.9")));
    h.resolver.set_answer(Some(vec![ip("203.0.113.5")]));

    let errors = h.engine.reconcile_once().await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("no more updates will be attempted for an hour"));

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Fail);
    assert_eq!(record.last_ban, Some(banned_at));
    assert_eq!(record.history.len(), 1);
    assert_eq!(h.notifier.messages().len(), 1);
    assert_eq!(provider.update_call_count(), 1);

    h.clock.advance(Duration::from_secs(30 * 60));
    h.engine.reconcile_once().await;
    assert_eq!(provider.update_call_count(), 1, "banned record must be skipped");

    h.clock.advance(Duration::from_secs(31 * 60));
    provider.set_reply(Reply::Echo);
    assert!(h.engine.reconcile_once().await.is_empty());
    assert_eq!(provider.update_call_count(), 2);

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.last_ban, None);
}

#[tokio::test]
async fn ipv6_prefix_masks_interface_identifier() {
    let provider = MockProvider::new("home", IpVersion::Ipv6);
    let config = EngineConfig {
        ipv6_prefix: 56,
        ..manual_config()
    };
    let h = harness(
        vec![(
            MockProvider::sharing_counters_with(&provider),
            history_of(ip("2001:db8:a:ff::1"), t0()),
        )],
        config,
    )
    .await;
    h.clock.advance(Duration::from_secs(3600));
    h.fetcher
        .set_ipv6(Some(ip("2001:db8:a:b:1111:2222:3333:4444")));
    h.resolver.set_answer(Some(vec![ip("2001:db8:a:ff::1")]));

    assert!(h.engine.reconcile_once().await.is_empty());

    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::UpToDate);
    assert_eq!(provider.update_call_count(), 0);
    assert_eq!(h.fetcher.ip6_call_count(), 1);
}

#[tokio::test]
async fn force_update_runs_between_ticks() {
    let provider = MockProvider::new("home", IpVersion::Ipv4);
    let config = EngineConfig {
        period: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let mut h = harness(
        vec![(
            MockProvider::sharing_counters_with(&provider),
            history_of(ip("203.0.113.5"), t0()),
        )],
        config,
    )
    .await;
    h.clock.advance(Duration::from_secs(3600));
    h.fetcher.set_ipv4(Some(ip("203.0.113.9")));
    h.resolver.set_answer(Some(vec![ip("203.0.113.5")]));

    let force = h.engine.force_handle();
    h.engine.start().await.unwrap();

    let errors = force.force_update().await;
    assert!(errors.is_empty(), "{errors:?}");
    let record = h.records.select(0).await.unwrap();
    assert_eq!(record.status, Status::Success);
    let calls = provider.update_call_count();
    assert_eq!(calls, 1);

    // The clock stays within the cooldown, so ticks must not update again
    h.fetcher.set_ipv4(Some(ip("203.0.113.10")));
    h.resolver.set_answer(Some(vec![ip("203.0.113.9")]));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(provider.update_call_count(), calls);
    assert!(h.fetcher.ip4_call_count() > 1, "ticks kept fetching");

    h.engine.stop().await.unwrap();
}
