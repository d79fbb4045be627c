//! axum router run as a lifecycle service

use async_trait::async_trait;
use axum::Router;
use ddns_core::lifecycle::Service;
use ddns_core::{Error, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Serves a router on a TCP address between `start` and `stop`.
///
/// A serve failure after a successful bind is reported on the run-error
/// channel.
pub struct HttpService {
    name: &'static str,
    address: String,
    router: Router,
    local_addr: Option<SocketAddr>,
    running: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl HttpService {
    pub fn new(name: &'static str, address: impl Into<String>, router: Router) -> Self {
        Self {
            name,
            address: bind_address(address.into()),
            router,
            local_addr: None,
            running: None,
        }
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Expand a `:port` address to every IPv4 interface.
fn bind_address(address: String) -> String {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address,
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<Error>>> {
        if self.running.is_some() {
            return Err(Error::service(self.name, "already started"));
        }

        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|e| Error::service(self.name, format!("listening on {}: {e}", self.address)))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("{} listening on {}", self.name, local_addr);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (error_tx, error_rx) = mpsc::channel(1);
        let router = self.router.clone();
        let name = self.name;

        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop_rx.wait_for(|stopping| *stopping).await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                let _ = error_tx.send(Error::service(name, e.to_string())).await;
            }
        });

        self.running = Some((stop_tx, handle));
        Ok(Some(error_rx))
    }

    async fn stop(&mut self) -> Result<()> {
        let Some((stop_tx, handle)) = self.running.take() else {
            return Ok(());
        };
        let _ = stop_tx.send(true);
        handle
            .await
            .map_err(|e| Error::service(self.name, format!("task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn serves_until_stopped() {
        let router = Router::new().route("/", get(|| async { "pong" }));
        let mut service = HttpService::new("test", "127.0.0.1:0", router);
        service.start().await.unwrap();
        let url = format!("http://{}/", service.local_addr().unwrap());

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert_eq!(body, "pong");

        service.stop().await.unwrap();
        assert!(reqwest::get(&url).await.is_err());
    }

    #[test]
    fn port_only_addresses_bind_all_interfaces() {
        assert_eq!(bind_address(":8000".into()), "0.0.0.0:8000");
        assert_eq!(bind_address("127.0.0.1:9999".into()), "127.0.0.1:9999");
        assert_eq!(bind_address("[::1]:80".into()), "[::1]:80");
    }

    #[tokio::test]
    async fn port_only_address_starts() {
        let router = Router::new().route("/", get(|| async { "pong" }));
        let mut service = HttpService::new("server", ":0", router);
        service.start().await.unwrap();
        let port = service.local_addr().unwrap().port();

        let body = reqwest::get(format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bind_failure_fails_start() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let mut service = HttpService::new("test", address, Router::new());
        let err = service.start().await.unwrap_err();
        assert!(err.to_string().starts_with("test: listening on"), "{err}");
    }
}
