use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::ReceiverStream;

use super::Service;
use crate::error::{Error, Result};

/// Services started in one order and stopped in another.
pub struct Sequence {
    name: String,
    services: Vec<Box<dyn Service>>,
    stop_order: Vec<String>,
    started: Vec<bool>,
    forwarder: Option<JoinHandle<()>>,
}

impl Sequence {
    /// Create a sequence.
    ///
    /// `services` are started in the given order; `stop_order` lists every
    /// service name exactly once, in the order they must be stopped.
    pub fn new(
        name: impl Into<String>,
        services: Vec<Box<dyn Service>>,
        stop_order: &[&str],
    ) -> Result<Self> {
        let name = name.into();
        let mut names: Vec<&str> = services.iter().map(|s| s.name()).collect();
        let mut wanted = stop_order.to_vec();
        names.sort_unstable();
        wanted.sort_unstable();
        if names != wanted {
            return Err(Error::service(
                &name,
                format!("stop order {stop_order:?} does not match services {names:?}"),
            ));
        }
        let started = vec![false; services.len()];
        Ok(Self {
            name,
            stop_order: stop_order.iter().map(|s| s.to_string()).collect(),
            services,
            started,
            forwarder: None,
        })
    }

    /// Stop every started service in stop order, returning the first error.
    async fn stop_started(&mut self) -> Result<()> {
        let mut first_error = None;
        for name in &self.stop_order {
            let Some(i) = self.services.iter().position(|s| s.name() == name) else {
                continue;
            };
            if !self.started[i] {
                continue;
            }
            self.started[i] = false;
            tracing::debug!("Stopping {}", name);
            if let Err(e) = self.services[i].stop().await {
                tracing::error!("Stopping {}: {}", name, e);
                first_error.get_or_insert(Error::service(name, format!("stopping: {e}")));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Service for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        let mut run_errors = StreamMap::new();

        for i in 0..self.services.len() {
            let name = self.services[i].name().to_string();
            tracing::debug!("Starting {}", name);
            match self.services[i].start().await {
                Ok(run_error) => {
                    self.started[i] = true;
                    if let Some(rx) = run_error {
                        run_errors.insert(name, ReceiverStream::new(rx));
                    }
                }
                Err(e) => {
                    if let Err(stop_err) = self.stop_started().await {
                        tracing::warn!("Rolling back {}: {}", self.name, stop_err);
                    }
                    return Err(Error::service(name, format!("starting: {e}")));
                }
            }
        }

        let (tx, rx) = mpsc::channel(1);
        self.forwarder = Some(tokio::spawn(async move {
            if let Some((name, err)) = run_errors.next().await {
                let _ = tx.send(Error::service(name, err.to_string())).await;
            }
        }));
        Ok(Some(rx))
    }

    async fn stop(&mut self) -> Result<()> {
        let result = self.stop_started().await;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        result
    }
}
