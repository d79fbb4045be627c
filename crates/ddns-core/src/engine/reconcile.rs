//! One pass of the update loop: fetch, decide, apply.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::decide::{self, NeededVersions, PublicIps};
use super::Clock;
use crate::error::{Error, Result};
use crate::healthchecksio;
use crate::ipv6::{mask_ip, with_suffix};
use crate::models::{HistoryEvent, IpVersion, Record, Status};
use crate::notify::Notifier;
use crate::records::RecordStore;
use crate::traits::provider::describe;
use crate::traits::{LookupIp, PublicIpFetcher};

/// Attempts to fetch each public IP flavor.
pub const FETCH_TRIES: usize = 3;

/// Attempts to resolve a record before updating it anyway.
pub const LOOKUP_TRIES: usize = 5;

/// Message of an unset record whose public IP could not be fetched.
pub const NO_PUBLIC_IP_MESSAGE: &str = "public IP address not found";

/// Everything a reconciliation needs, cheap to clone into the run task.
#[derive(Clone)]
pub(crate) struct Reconciler {
    pub(crate) records: Arc<RecordStore>,
    pub(crate) fetcher: Arc<dyn PublicIpFetcher>,
    pub(crate) resolver: Arc<dyn LookupIp>,
    pub(crate) client: reqwest::Client,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) healthchecks: Option<healthchecksio::Client>,
    pub(crate) cooldown: Duration,
    pub(crate) ipv6_prefix: u8,
    pub(crate) clock: Clock,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    /// Run one reconciliation, returning every error met along the way.
    pub(crate) async fn reconcile(&self) -> Vec<Error> {
        let records = self.records.select_all().await;
        let needed = decide::needed_versions(&records);
        let (ips, mut errors) = self.fetch_needed(needed).await;
        if self.is_shutting_down() {
            return vec![Error::Cancelled];
        }

        let now = (self.clock)();
        let mut selected = Vec::new();
        for (id, record) in records.iter().enumerate() {
            if let Some(target) = self.should_update(record, &ips, now).await {
                selected.push((id, target));
            }
        }

        for (id, record) in records.iter().enumerate() {
            if record.status != Status::Unset || selected.iter().any(|(s, _)| *s == id) {
                continue;
            }
            let target = ips
                .for_version(record.provider.ip_version())
                .map(|ip| with_suffix(ip, record.provider.ipv6_suffix()));
            if let Err(e) = self.set_initial_status(id, target, now).await {
                error!("Setting initial status of {}: {}", describe(record.provider.as_ref()), e);
                errors.push(e);
            }
        }

        for (id, target) in selected {
            if let Err(e) = self.update_record(id, target, now).await {
                error!("{}", e);
                errors.push(e);
            }
        }

        self.ping(&errors).await;
        errors
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Race `fut` against shutdown.
    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow_and_update() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    /// Fetch each needed flavor; IPv6 addresses come back masked.
    async fn fetch_needed(&self, needed: NeededVersions) -> (PublicIps, Vec<Error>) {
        let mut ips = PublicIps::default();
        let mut errors = Vec::new();
        let wanted = [
            (needed.ip, IpVersion::Ipv4OrIpv6),
            (needed.ipv4, IpVersion::Ipv4),
            (needed.ipv6, IpVersion::Ipv6),
        ];

        for (wanted, version) in wanted {
            if !wanted {
                continue;
            }
            match self.fetch(version).await {
                Ok(ip) => {
                    let ip = mask_ip(ip, self.ipv6_prefix);
                    debug!("Public {} is {}", version.ip_kind(), ip);
                    match version {
                        IpVersion::Ipv4OrIpv6 => ips.ip = Some(ip),
                        IpVersion::Ipv4 => ips.ipv4 = Some(ip),
                        IpVersion::Ipv6 => ips.ipv6 = Some(ip),
                    }
                }
                Err(e) if e.is_cancelled() => {
                    errors.push(e);
                    break;
                }
                Err(e) => {
                    error!("Fetching public {}: {}", version.ip_kind(), e);
                    errors.push(e);
                }
            }
        }
        (ips, errors)
    }

    async fn fetch(&self, version: IpVersion) -> Result<IpAddr> {
        let mut last_error = Error::public_ip(format!("no public {} fetched", version.ip_kind()));
        for attempt in 1..=FETCH_TRIES {
            let fetched = match version {
                IpVersion::Ipv4OrIpv6 => self.fetcher.ip(),
                IpVersion::Ipv4 => self.fetcher.ip4(),
                IpVersion::Ipv6 => self.fetcher.ip6(),
            };
            match self.cancellable(fetched).await {
                Ok(ip) if version.accepts(&ip) => return Ok(ip),
                Ok(ip) => {
                    last_error = Error::public_ip(format!(
                        "fetched {ip} is not an {}",
                        version.ip_kind()
                    ));
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => last_error = e,
            }
            debug!(
                "Try {} of {} fetching public {} failed: {}",
                attempt,
                FETCH_TRIES,
                version.ip_kind(),
                last_error
            );
        }
        Err(last_error)
    }

    /// Resolve `fqdn`, splitting the answer into its last IPv4 and IPv6.
    async fn lookup(&self, fqdn: &str) -> Result<(Option<IpAddr>, Option<IpAddr>)> {
        let mut last_error = Error::resolver(format!("no lookup of {fqdn} attempted"));
        for _ in 0..LOOKUP_TRIES {
            match self.cancellable(self.resolver.lookup_ip(fqdn)).await {
                Ok(ips) => return Ok(decide::split_lookup(&ips)),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// The address to publish for `record`, if it needs an update.
    async fn should_update(
        &self,
        record: &Record,
        ips: &PublicIps,
        now: DateTime<Utc>,
    ) -> Option<IpAddr> {
        let provider = record.provider.as_ref();
        let fqdn = provider.build_domain_name();

        if decide::within_ban(record, now) {
            debug!("Record {} is banned, skipping update", fqdn);
            return None;
        }
        if decide::within_cooldown(record, now, self.cooldown) {
            debug!("Record {} was updated recently, skipping update", fqdn);
            return None;
        }

        let version = provider.ip_version();
        let Some(public) = ips.for_version(version) else {
            debug!("No public {} to compare {} against", version.ip_kind(), fqdn);
            return None;
        };
        let target = with_suffix(public, provider.ipv6_suffix());
        let compared = mask_ip(target, self.ipv6_prefix);

        if provider.proxied() {
            let current = record.history.current_ip().map(|ip| mask_ip(ip, self.ipv6_prefix));
            if current == Some(compared) {
                debug!("Proxied record {} already uses {}", fqdn, target);
                return None;
            }
            info!(
                "Proxied record {} last set to {} has to be updated to {}",
                fqdn,
                current.map_or_else(|| "nothing".to_string(), |ip| ip.to_string()),
                target
            );
            return Some(target);
        }

        let (record_ipv4, record_ipv6) = match self.lookup(&fqdn).await {
            Ok(answer) => answer,
            Err(e) if e.is_cancelled() => {
                warn!("Looking up {} was cancelled", fqdn);
                return None;
            }
            Err(e) => {
                warn!(
                    "Cannot resolve {} after {} tries, updating anyway: {}",
                    fqdn, LOOKUP_TRIES, e
                );
                (None, None)
            }
        };
        let record_ipv4 = record_ipv4.map(|ip| mask_ip(ip, self.ipv6_prefix));
        let record_ipv6 = record_ipv6.map(|ip| mask_ip(ip, self.ipv6_prefix));

        if decide::drifted(version, compared, record_ipv4, record_ipv6) {
            info!("Record {} has to be updated to {}", fqdn, target);
            Some(target)
        } else {
            debug!("Record {} already resolves to {}", fqdn, target);
            None
        }
    }

    /// Mark a never-updated record as up to date, seeding its history.
    async fn set_initial_status(
        &self,
        id: usize,
        target: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut record = self.records.select(id).await?;
        record.time = Some(now);
        match target {
            Some(ip) => {
                record.status = Status::UpToDate;
                record.message = format!("no IP change for {ip}");
                if record.history.is_empty() {
                    record.history.push(HistoryEvent::new(ip, now));
                }
            }
            None => {
                record.status = Status::Fail;
                record.message = NO_PUBLIC_IP_MESSAGE.to_string();
            }
        }
        self.records.update(id, record).await
    }

    /// Push `target` to the record's provider and record the outcome.
    async fn update_record(&self, id: usize, target: IpAddr, now: DateTime<Utc>) -> Result<()> {
        let mut record = self.records.select(id).await?;
        let fqdn = record.provider.build_domain_name();

        record.status = Status::Updating;
        record.time = Some(now);
        self.records.update(id, record.clone()).await?;

        info!("Updating {} to {}", describe(record.provider.as_ref()), target);
        let outcome = self
            .cancellable(record.provider.update(&self.client, target))
            .await;

        let failure = match outcome {
            Err(Error::Cancelled) => {
                record.status = Status::Fail;
                record.message = Error::Cancelled.to_string();
                Some(Error::Cancelled)
            }
            Err(e) => {
                record.status = Status::Fail;
                record.message = e.to_string();
                if e.is_ban() {
                    record.last_ban = Some(now);
                    let message =
                        format!("{fqdn}: {e}, no more updates will be attempted for an hour");
                    self.notifier.notify(&message).await;
                    Some(Error::provider(record.provider.name(), message))
                } else {
                    record.last_ban = None;
                    Some(Error::provider(record.provider.name(), format!("{fqdn}: {e}")))
                }
            }
            Ok(new_ip) if record.history.current_ip() == Some(new_ip) => {
                record.status = Status::UpToDate;
                record.message = format!("no IP change for {new_ip}");
                record.last_ban = None;
                None
            }
            Ok(new_ip) => {
                record.status = Status::Success;
                record.message = format!("changed to {new_ip}");
                record.last_ban = None;
                record.history.push(HistoryEvent::new(new_ip, now));
                self.notifier.notify(&format!("{fqdn} changed to {new_ip}")).await;
                None
            }
        };

        if let Err(e) = self.records.update(id, record.clone()).await {
            if failure.is_none() {
                record.status = Status::Fail;
                record.message = e.to_string();
                // The event is already in memory, this only records the failure
                if let Err(again) = self.records.update(id, record).await {
                    warn!("Recording persistence failure of {}: {}", fqdn, again);
                }
            }
            return Err(failure.unwrap_or(e));
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ping(&self, errors: &[Error]) {
        let Some(healthchecks) = &self.healthchecks else {
            return;
        };
        let state = if errors.is_empty() {
            healthchecksio::State::Ok
        } else {
            healthchecksio::State::Fail
        };
        if let Err(e) = self.cancellable(healthchecks.ping(state)).await
            && !e.is_cancelled()
        {
            warn!("Pinging healthchecks.io: {}", e);
        }
    }
}
