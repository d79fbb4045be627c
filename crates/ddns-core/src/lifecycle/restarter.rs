use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use super::Service;
use crate::error::{Error, Result};

/// Restart the wrapped service each time it reports a run error.
///
/// Only a failed restart is reported on the restarter's own run-error
/// channel.
pub struct Restarter {
    name: String,
    inner: Arc<Mutex<Box<dyn Service>>>,
    supervisor: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl Restarter {
    /// Wrap a service
    pub fn new(inner: Box<dyn Service>) -> Self {
        Self {
            name: inner.name().to_string(),
            inner: Arc::new(Mutex::new(inner)),
            supervisor: None,
        }
    }
}

#[async_trait]
impl Service for Restarter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        let first_run = self.inner.lock().await.start().await?;
        let Some(mut run_error) = first_run else {
            return Ok(None);
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (error_tx, error_rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    err = run_error.recv() => {
                        let Some(err) = err else { return };
                        tracing::warn!("{} crashed: {}, restarting it", name, err);
                        let mut service = inner.lock().await;
                        if let Err(e) = service.stop().await {
                            tracing::debug!("Stopping crashed {}: {}", name, e);
                        }
                        match service.start().await {
                            Ok(Some(rx)) => run_error = rx,
                            Ok(None) => return,
                            Err(e) => {
                                let _ = error_tx
                                    .send(Error::service(&name, format!("restarting: {e}")))
                                    .await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        self.supervisor = Some((stop_tx, handle));
        Ok(Some(error_rx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some((stop_tx, handle)) = self.supervisor.take() {
            let _ = stop_tx.send(true);
            let _ = handle.await;
        }
        self.inner.lock().await.stop().await
    }
}
