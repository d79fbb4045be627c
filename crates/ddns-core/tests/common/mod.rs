//! Test doubles and common utilities for engine contract tests
//!
//! Every double counts its calls through shared `Arc<AtomicUsize>` counters
//! so a test can keep a handle after moving the double into the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use ddns_core::engine::Clock;
use ddns_core::error::{Error, Result};
use ddns_core::models::{History, HistoryEvent, IpVersion, Record};
use ddns_core::notify::Notifier;
use ddns_core::persistence::MemoryHistoryStore;
use ddns_core::records::RecordStore;
use ddns_core::traits::{LookupIp, Provider, PublicIpFetcher};
use ddns_core::{DdnsEngine, EngineConfig};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid IP literal")
}

/// Fixed reference instant of every test
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// What a [`MockProvider`] answers to `update`
#[derive(Clone)]
pub enum Reply {
    /// Echo the requested IP
    Echo,
    /// Return this IP whatever was requested
    Ip(IpAddr),
    /// Fail with an abuse ban
    Banned,
    /// Fail with a non-ban error
    Broken,
}

/// A provider driver that records its calls
pub struct MockProvider {
    pub domain: String,
    pub owner: String,
    pub version: IpVersion,
    pub proxied: bool,
    reply: Arc<Mutex<Reply>>,
    update_calls: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<IpAddr>>>,
}

impl MockProvider {
    pub fn new(owner: &str, version: IpVersion) -> Self {
        Self {
            domain: "example.com".to_string(),
            owner: owner.to_string(),
            version,
            proxied: false,
            reply: Arc::new(Mutex::new(Reply::Echo)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn proxied(mut self) -> Self {
        self.proxied = true;
        self
    }

    /// Create a new MockProvider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            domain: other.domain.clone(),
            owner: other.owner.clone(),
            version: other.version,
            proxied: other.proxied,
            reply: Arc::clone(&other.reply),
            update_calls: Arc::clone(&other.update_calls),
            requested: Arc::clone(&other.requested),
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// IPs passed to `update`, in call order
    pub fn requested(&self) -> Vec<IpAddr> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn ip_version(&self) -> IpVersion {
        self.version
    }

    fn proxied(&self) -> bool {
        self.proxied
    }

    async fn update(&self, _client: &reqwest::Client, ip: IpAddr) -> Result<IpAddr> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(ip);
        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Echo => Ok(ip),
            Reply::Ip(other) => Ok(other),
            Reply::Banned => Err(Error::banned("abuse")),
            Reply::Broken => Err(Error::unknown_response("911")),
        }
    }
}

/// A public IP fetcher with settable answers per flavor
#[derive(Clone, Default)]
pub struct MockFetcher {
    ip: Arc<Mutex<Option<IpAddr>>>,
    ipv4: Arc<Mutex<Option<IpAddr>>>,
    ipv6: Arc<Mutex<Option<IpAddr>>>,
    ip_calls: Arc<AtomicUsize>,
    ip4_calls: Arc<AtomicUsize>,
    ip6_calls: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ip(&self, value: Option<IpAddr>) {
        *self.ip.lock().unwrap() = value;
    }

    pub fn set_ipv4(&self, value: Option<IpAddr>) {
        *self.ipv4.lock().unwrap() = value;
    }

    pub fn set_ipv6(&self, value: Option<IpAddr>) {
        *self.ipv6.lock().unwrap() = value;
    }

    pub fn ip_call_count(&self) -> usize {
        self.ip_calls.load(Ordering::SeqCst)
    }

    pub fn ip4_call_count(&self) -> usize {
        self.ip4_calls.load(Ordering::SeqCst)
    }

    pub fn ip6_call_count(&self) -> usize {
        self.ip6_calls.load(Ordering::SeqCst)
    }

    fn answer(slot: &Mutex<Option<IpAddr>>, calls: &AtomicUsize) -> Result<IpAddr> {
        calls.fetch_add(1, Ordering::SeqCst);
        slot.lock()
            .unwrap()
            .ok_or_else(|| Error::public_ip("no address configured"))
    }
}

#[async_trait]
impl PublicIpFetcher for MockFetcher {
    async fn ip(&self) -> Result<IpAddr> {
        Self::answer(&self.ip, &self.ip_calls)
    }

    async fn ip4(&self) -> Result<IpAddr> {
        Self::answer(&self.ipv4, &self.ip4_calls)
    }

    async fn ip6(&self) -> Result<IpAddr> {
        Self::answer(&self.ipv6, &self.ip6_calls)
    }
}

/// A resolver with a settable answer, failing when the answer is `None`
#[derive(Clone, Default)]
pub struct MockResolver {
    answer: Arc<Mutex<Option<Vec<IpAddr>>>>,
    lookups: Arc<AtomicUsize>,
}

impl MockResolver {
    pub fn answering(ips: Vec<IpAddr>) -> Self {
        let resolver = Self::default();
        resolver.set_answer(Some(ips));
        resolver
    }

    pub fn set_answer(&self, ips: Option<Vec<IpAddr>>) {
        *self.answer.lock().unwrap() = ips;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupIp for MockResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::resolver(format!("SERVFAIL for {host}")))
    }
}

/// A notifier collecting messages
#[derive(Clone, Default)]
pub struct MockNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MockNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// A clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::from_std(by).unwrap();
    }

    pub fn clock(&self) -> Clock {
        let now = Arc::clone(&self.now);
        Arc::new(move || *now.lock().unwrap())
    }
}

/// History holding a single event
pub fn history_of(ip: IpAddr, time: DateTime<Utc>) -> History {
    History::new(vec![HistoryEvent::new(ip, time)])
}

/// Everything a contract test pokes at
pub struct Harness {
    pub engine: DdnsEngine,
    pub records: Arc<RecordStore>,
    pub history: MemoryHistoryStore,
    pub fetcher: MockFetcher,
    pub resolver: MockResolver,
    pub notifier: MockNotifier,
    pub clock: ManualClock,
}

/// Build an engine over `records`, with the history already persisted.
///
/// Seeding counts as history writes: compare `history.write_count()`
/// against its value right after this returns.
pub async fn harness(records: Vec<(MockProvider, History)>, config: EngineConfig) -> Harness {
    use ddns_core::traits::HistoryStore;

    let history = MemoryHistoryStore::new();
    let mut built = Vec::new();
    for (provider, events) in records {
        for event in events.events() {
            history
                .store_new_ip(
                    provider.domain(),
                    provider.owner(),
                    provider.ip_version(),
                    event.ip,
                    event.time,
                )
                .await
                .unwrap();
        }
        built.push(Record::new(Arc::new(provider), events));
    }
    let records = Arc::new(RecordStore::new(built, Arc::new(history.clone())));
    let fetcher = MockFetcher::new();
    let resolver = MockResolver::default();
    let notifier = MockNotifier::default();
    let clock = ManualClock::starting_at(t0());

    let engine = DdnsEngine::new(
        config,
        Arc::clone(&records),
        Arc::new(fetcher.clone()),
        Arc::new(resolver.clone()),
        reqwest::Client::new(),
    )
    .with_notifier(Arc::new(notifier.clone()))
    .with_clock(clock.clock());

    Harness {
        engine,
        records,
        history,
        fetcher,
        resolver,
        notifier,
        clock,
    }
}

/// Engine tuning with a long period, so only forced or manual runs happen
pub fn manual_config() -> EngineConfig {
    EngineConfig {
        period: Duration::from_secs(3600),
        ..EngineConfig::default()
    }
}
