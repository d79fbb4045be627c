//! Periodic backup of the data directory files.
//!
//! Every period, `updates.json` and `config.json` are copied into a fresh
//! `ddns-updater-backup-<unix millis>` directory. A failed copy is reported
//! on the run-error channel; wrap the service in a
//! [`Restarter`](crate::lifecycle::Restarter) to keep it going.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::lifecycle::Service;

/// Prefix of every backup directory name.
pub const DIRECTORY_PREFIX: &str = "ddns-updater-backup-";

/// Service copying files to a backup directory on a fixed period.
pub struct BackupService {
    period: Duration,
    destination: PathBuf,
    files: Vec<PathBuf>,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl BackupService {
    /// Create a backup service for `files`, written under `destination`
    pub fn new(period: Duration, destination: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            period,
            destination: destination.into(),
            files,
            running: None,
        }
    }
}

/// Copy `files` into a new timestamped directory under `destination`.
///
/// Missing source files are skipped. Returns the created directory.
pub async fn backup_once(destination: &Path, files: &[PathBuf]) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().timestamp_millis();
    let directory = destination.join(format!("{DIRECTORY_PREFIX}{stamp}"));
    tokio::fs::create_dir_all(&directory).await.map_err(|e| {
        Error::Other(format!("creating backup directory {}: {e}", directory.display()))
    })?;

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        match tokio::fs::copy(file, directory.join(name)).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Skipping backup of missing file {}", file.display());
            }
            Err(e) => {
                return Err(Error::Other(format!("backing up {}: {e}", file.display())));
            }
        }
    }
    Ok(directory)
}

#[async_trait]
impl Service for BackupService {
    fn name(&self) -> &str {
        "backup"
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        if self.period.is_zero() {
            return Err(Error::config("backup period must be greater than 0"));
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (error_tx, error_rx) = mpsc::channel(1);
        let destination = self.destination.clone();
        let files = self.files.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    _ = ticker.tick() => {
                        match backup_once(&destination, &files).await {
                            Ok(directory) => tracing::info!("Backed up to {}", directory.display()),
                            Err(e) => {
                                let _ = error_tx.send(e).await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        self.running = Some((stop_tx, handle));
        Ok(Some(error_rx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some((stop_tx, handle)) = self.running.take() {
            let _ = stop_tx.send(true);
            handle
                .await
                .map_err(|e| Error::service("backup", format!("task failed: {e}")))?;
        }
        Ok(())
    }
}
