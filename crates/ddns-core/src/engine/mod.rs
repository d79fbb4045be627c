//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Fetching the public IPs the configured records need
//! - Deciding which records drifted from the public IP
//! - Updating drifted records through their provider
//! - Recording every outcome in the record store
//!
//! ## Architecture
//!
//! ```text
//!  ticker ─────┐
//!              ├──▶ ┌──────────────┐
//!  force ──────┘    │  DdnsEngine  │
//!                   └──────────────┘
//!                          │
//!      ┌───────────────────┼───────────────────┐
//!      ▼                   ▼                   ▼
//! ┌───────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Fetcher   │     │ LookupIp    │     │ Provider    │
//! │ (public)  │     │ (decide)    │     │ (update)    │
//! └───────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Reconciliation
//!
//! 1. Fetch each needed public IP flavor, masking IPv6
//! 2. Skip banned and cooling-down records
//! 3. Compare with the last set IP (proxied) or the DNS answer
//! 4. Mark never-evaluated records that need nothing as up to date
//! 5. Update selected records one at a time
//! 6. Ping healthchecks.io with the overall outcome

pub mod decide;
mod reconcile;

pub use decide::{BAN_PERIOD, NeededVersions, PublicIps};
pub use reconcile::{FETCH_TRIES, LOOKUP_TRIES, NO_PUBLIC_IP_MESSAGE};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::healthchecksio;
use crate::lifecycle::Service;
use crate::notify::{LogNotifier, Notifier};
use crate::records::RecordStore;
use crate::traits::{LookupIp, PublicIpFetcher};
use reconcile::Reconciler;

/// Source of the current time, swappable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time between two periodic reconciliations
    pub period: Duration,

    /// Minimum time between a success and the next update of a record
    pub cooldown: Duration,

    /// Prefix length IPv6 addresses are masked to
    pub ipv6_prefix: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(600),
            cooldown: Duration::from_secs(300),
            ipv6_prefix: crate::ipv6::IPV6_BITS,
        }
    }
}

impl EngineConfig {
    /// Engine tuning from the process settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            period: settings.period,
            cooldown: settings.cooldown,
            ipv6_prefix: settings.ipv6_prefix,
        }
    }
}

type ForceRequest = oneshot::Sender<Vec<Error>>;

/// Requests an immediate reconciliation from a running engine.
#[derive(Clone)]
pub struct ForceHandle {
    tx: mpsc::Sender<ForceRequest>,
}

impl ForceHandle {
    /// Trigger a reconciliation and wait for its errors.
    ///
    /// Requests queue behind a reconciliation in progress. If the engine is
    /// not running, or stops before answering, the result is a single
    /// [`Error::Cancelled`].
    pub async fn force_update(&self) -> Vec<Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(reply_tx).await.is_err() {
            return vec![Error::Cancelled];
        }
        reply_rx.await.unwrap_or_else(|_| vec![Error::Cancelled])
    }
}

/// Core DDNS engine
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`] and optional `with_*` builders
/// 2. Take a [`ForceHandle`] for the API server
/// 3. Start through [`Service::start`]; the run loop lives in its own task
/// 4. Stop through [`Service::stop`], which cancels in-flight network calls
///
/// Provider updates run one record at a time: no two updates are ever in
/// flight concurrently.
pub struct DdnsEngine {
    reconciler: Reconciler,
    period: Duration,
    force_tx: mpsc::Sender<ForceRequest>,
    force_rx: Option<mpsc::Receiver<ForceRequest>>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `config`: periods and IPv6 masking
    /// - `records`: record store shared with the servers
    /// - `fetcher`: public IP fetcher
    /// - `resolver`: resolver for the managed hostnames
    /// - `client`: HTTP client handed to providers
    pub fn new(
        config: EngineConfig,
        records: Arc<RecordStore>,
        fetcher: Arc<dyn PublicIpFetcher>,
        resolver: Arc<dyn LookupIp>,
        client: reqwest::Client,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (force_tx, force_rx) = mpsc::channel(1);

        let reconciler = Reconciler {
            records,
            fetcher,
            resolver,
            client,
            notifier: Arc::new(LogNotifier),
            healthchecks: None,
            cooldown: config.cooldown,
            ipv6_prefix: config.ipv6_prefix,
            clock: Arc::new(Utc::now),
            shutdown: shutdown_rx,
        };

        Self {
            reconciler,
            period: config.period,
            force_tx,
            force_rx: Some(force_rx),
            shutdown_tx,
            task: None,
        }
    }

    /// Deliver change and ban notifications to `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.reconciler.notifier = notifier;
        self
    }

    /// Ping `client` after every reconciliation
    pub fn with_healthchecks(mut self, client: healthchecksio::Client) -> Self {
        self.reconciler.healthchecks = client.is_enabled().then_some(client);
        self
    }

    /// Read the time from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.reconciler.clock = clock;
        self
    }

    /// Handle to request immediate reconciliations
    pub fn force_handle(&self) -> ForceHandle {
        ForceHandle {
            tx: self.force_tx.clone(),
        }
    }

    /// Run one reconciliation on the caller's task.
    ///
    /// Mostly useful to drive the engine step by step in tests.
    pub async fn reconcile_once(&self) -> Vec<Error> {
        self.reconciler.reconcile().await
    }
}

async fn run(
    reconciler: Reconciler,
    period: Duration,
    mut force_rx: mpsc::Receiver<ForceRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                debug!("Update loop stopping");
                return;
            }

            _ = ticker.tick() => {
                let errors = reconciler.reconcile().await;
                if !errors.is_empty() {
                    warn!("Periodic update finished with {} error(s)", errors.len());
                }
            }

            Some(reply) = force_rx.recv() => {
                info!("Forced update requested");
                let errors = reconciler.reconcile().await;
                // The requester may have given up waiting
                let _ = reply.send(errors);
            }
        }
    }
}

#[async_trait]
impl Service for DdnsEngine {
    fn name(&self) -> &str {
        "updater"
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        let force_rx = self
            .force_rx
            .take()
            .ok_or_else(|| Error::service("updater", "already started"))?;

        let reconciler = self.reconciler.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let period = self.period;
        info!("Updating records every {:?}", period);
        self.task = Some(tokio::spawn(run(reconciler, period, force_rx, shutdown)));
        Ok(None)
    }

    async fn stop(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::service("updater", format!("task failed: {e}")))?;
        }
        Ok(())
    }
}
