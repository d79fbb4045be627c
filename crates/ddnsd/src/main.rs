// # ddnsd - DDNS Daemon
//
// Thin integration layer: all update logic lives in ddns-core and the
// provider and public IP crates. The daemon is responsible for:
// 1. Reading settings from environment variables and `config.json`
// 2. Initializing logging and the runtime
// 3. Registering providers and building the public IP fetchers
// 4. Starting the services in order and stopping them on a signal
//
// ## Usage
//
// ```bash
// ddnsd               # run the updater
// ddnsd healthcheck   # query the local health server, for container probes
// ddnsd version       # print the version
// ```
//
// ## Configuration
//
// See `ddns_core::config` for the environment variables. Records are read
// from `$DATADIR/config.json`, or from `$CONFIG` when set:
//
// ```bash
// export PERIOD=5m
// export CONFIG='{"settings":[{"provider":"duckdns","domain":"myhost.duckdns.org","token":"..."}]}'
// ddnsd
// ```

mod health;
mod http;
mod server;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use ddns_core::config::{Settings, load_settings};
use ddns_core::healthchecksio::{self, State};
use ddns_core::lifecycle::{Noop, Restarter, Sequence, Service};
use ddns_core::persistence::JsonHistoryStore;
use ddns_core::publicip::CyclingFetcher;
use ddns_core::resolver::HickoryLookup;
use ddns_core::traits::{LookupIp, PublicIpFetcher};
use ddns_core::{DdnsEngine, EngineConfig, ProviderRegistry, RecordStore};
use ddns_ip_dns::DnsFetcher;
use ddns_ip_http::HttpFetcher;
use http::HttpService;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Grace period for stopping every service
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown, or a passing healthcheck
    CleanShutdown = 0,
    /// Configuration, startup, runtime or shutdown failure
    Failure = 1,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    match env::args().nth(1).as_deref() {
        Some("version" | "-version" | "--version") => {
            println!("ddnsd {VERSION}");
            return DdnsExitCode::CleanShutdown.into();
        }
        Some("healthcheck") => return healthcheck().into(),
        _ => {}
    }

    let settings = match Settings::from_env().and_then(|s| s.validate().map(|()| s)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return DdnsExitCode::Failure.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&settings.log_level))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return DdnsExitCode::Failure.into();
    }

    info!("Starting ddnsd {}", VERSION);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::Failure.into();
        }
    };

    rt.block_on(async {
        match run_daemon(settings).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("{:#}", e);
                DdnsExitCode::Failure
            }
        }
    })
    .into()
}

fn log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Probe the local health server, for container liveness checks
fn healthcheck() -> DdnsExitCode {
    let address = match Settings::from_env() {
        Ok(settings) => settings.health.server_address,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return DdnsExitCode::Failure;
        }
    };
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|rt| Ok(rt.block_on(ddns_core::health::probe(&address))?));

    match result {
        Ok(()) => DdnsExitCode::CleanShutdown,
        Err(e) => {
            eprintln!("{e}");
            DdnsExitCode::Failure
        }
    }
}

/// Register the providers compiled in
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    ddns_provider_cloudflare::register(&registry);

    #[cfg(feature = "duckdns")]
    ddns_provider_duckdns::register(&registry);

    #[cfg(feature = "noip")]
    ddns_provider_noip::register(&registry);

    #[cfg(feature = "custom")]
    ddns_provider_custom::register(&registry);

    registry
}

/// Combine the enabled public IP fetchers, alternating between them
fn build_fetcher(client: reqwest::Client, settings: &Settings) -> Result<Arc<dyn PublicIpFetcher>> {
    let mut fetchers: Vec<Arc<dyn PublicIpFetcher>> = Vec::new();
    if settings.public_ip.fetchers.http {
        fetchers.push(Arc::new(HttpFetcher::from_settings(client, settings)?));
    }
    if settings.public_ip.fetchers.dns {
        fetchers.push(Arc::new(DnsFetcher::from_settings(settings)?));
    }
    Ok(Arc::new(CyclingFetcher::new(fetchers)?))
}

/// Run the daemon
async fn run_daemon(settings: Settings) -> Result<()> {
    for line in settings.summary() {
        info!("{}", line);
    }

    let registry = build_registry();
    info!("Registered providers: {}", registry.list_providers().join(", "));

    let provider_settings = load_settings(settings.config_json.as_deref(), &settings.config_file)
        .await
        .context("loading provider settings")?;
    let providers = registry.create_all(&provider_settings)?;
    if providers.is_empty() {
        warn!("Found no setting to update any record");
    } else {
        info!("Found {} setting(s) to update records", providers.len());
    }

    let history = JsonHistoryStore::open(&settings.data_dir).await?;
    let history_path = history.path().to_path_buf();
    let records = Arc::new(RecordStore::load(providers, Arc::new(history)).await?);

    let client = reqwest::Client::builder()
        .timeout(settings.http_timeout)
        .user_agent(concat!("ddnsd/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let fetcher = build_fetcher(client.clone(), &settings)?;
    let resolver: Arc<dyn LookupIp> = Arc::new(HickoryLookup::new(&settings.resolver)?);
    let healthchecks = healthchecksio::Client::new(
        client.clone(),
        settings.health.healthchecksio_base_url.clone(),
        settings.health.healthchecksio_uuid.clone(),
    );

    let engine = DdnsEngine::new(
        EngineConfig::from_settings(&settings),
        Arc::clone(&records),
        fetcher,
        Arc::clone(&resolver),
        client,
    )
    .with_healthchecks(healthchecks.clone());
    let force = engine.force_handle();

    let health: Box<dyn Service> = if health::in_container() {
        Box::new(HttpService::new(
            "health",
            settings.health.server_address.clone(),
            health::router(Arc::clone(&records), resolver),
        ))
    } else {
        Box::new(Noop::new("health"))
    };

    let server: Box<dyn Service> = if settings.server.enabled {
        Box::new(HttpService::new(
            "server",
            settings.server.listening_address.clone(),
            server::router(&settings.server.root_url, Arc::clone(&records), force.clone()),
        ))
    } else {
        Box::new(Noop::new("server"))
    };

    let backup: Box<dyn Service> = if settings.backup.period.is_zero() {
        Box::new(Noop::new("backup"))
    } else {
        Box::new(Restarter::new(Box::new(ddns_core::backup::BackupService::new(
            settings.backup.period,
            settings.backup.directory.clone(),
            vec![history_path, settings.config_file.clone()],
        ))))
    };

    let mut sequence = Sequence::new(
        "ddnsd",
        vec![
            Box::new(records.service()) as Box<dyn Service>,
            Box::new(engine) as Box<dyn Service>,
            health,
            server,
            backup,
        ],
        &["server", "health", "updater", "backup", "database"],
    )?;

    let mut run_error = sequence.start().await?;
    if let Err(e) = healthchecks.ping(State::Start).await {
        warn!("healthchecks.io: {}", e);
    }

    let first_update = tokio::spawn(async move {
        for e in force.force_update().await {
            if !e.is_cancelled() {
                error!("{}", e);
            }
        }
    });

    let crashed = tokio::select! {
        signal = wait_for_shutdown() => match signal {
            Ok(signal) => {
                info!("Received {}, shutting down", signal);
                None
            }
            Err(e) => Some(e),
        },
        Some(err) = async { run_error.as_mut()?.recv().await } => {
            Some(anyhow::Error::from(err).context("service crashed"))
        }
    };

    let stopped = tokio::time::timeout(SHUTDOWN_TIMEOUT, sequence.stop()).await;
    let _ = first_update.await;

    let outcome = match (crashed, stopped) {
        (Some(err), _) => Err(err),
        (None, Err(_)) => Err(anyhow::anyhow!(
            "shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        )),
        (None, Ok(Err(e))) => Err(e.into()),
        (None, Ok(Ok(()))) => Ok(()),
    };

    let exit_state = if outcome.is_ok() { State::Exit0 } else { State::Exit1 };
    if let Err(e) = healthchecks.ping(exit_state).await {
        warn!("healthchecks.io: {}", e);
    }
    outcome
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// The name of the signal received
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("setting up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("setting up SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("waiting for CTRL-C")?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn registry_holds_default_providers() {
        let registry = build_registry();
        for name in ["cloudflare", "duckdns", "noip", "custom"] {
            assert!(registry.has_provider(name), "{name} missing");
        }
    }

    #[test]
    fn log_levels() {
        assert_eq!(log_level("DEBUG"), Level::DEBUG);
        assert_eq!(log_level("warn"), Level::WARN);
        assert_eq!(log_level("info"), Level::INFO);
    }

    #[test]
    fn fetchers_follow_settings() {
        let mut settings = Settings::from_lookup(|_| None).unwrap();
        assert_ok!(build_fetcher(reqwest::Client::new(), &settings));

        settings.public_ip.fetchers.http = false;
        assert_ok!(build_fetcher(reqwest::Client::new(), &settings));

        settings.public_ip.fetchers.dns = false;
        assert!(build_fetcher(reqwest::Client::new(), &settings).is_err());
    }
}
