//! Liveness of the updater
//!
//! A deployment is healthy when no record failed its last update and the
//! authoritative DNS of every non-proxied record contains the IP we last
//! set.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{Record, Status};
use crate::traits::LookupIp;

/// Timeout of the `healthcheck` probe request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Check every record, returning the first problem found.
pub async fn is_healthy(records: &[Record], resolver: &dyn LookupIp) -> Result<()> {
    for record in records {
        if record.status == Status::Fail {
            return Err(Error::Other(format!("record update failed: {record}")));
        }

        if record.provider.proxied() {
            continue;
        }

        let Some(current_ip) = record.history.current_ip() else {
            return Err(Error::Other(format!("no set IP address found: {record}")));
        };

        let hostname = record.provider.build_domain_name();
        let lookup_ips = resolver.lookup_ip(&hostname).await?;
        if !lookup_ips.contains(&current_ip) {
            let ips = lookup_ips
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Other(format!(
                "lookup IP addresses do not match: {ips} instead of {current_ip} for {hostname}"
            )));
        }
    }
    Ok(())
}

/// URL probed by the `healthcheck` sub-command for a server address.
///
/// Only the port of `address` is kept: the probe always targets the
/// loopback interface.
pub fn probe_url(address: &str) -> Result<String> {
    let port = address
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.is_empty())
        .ok_or_else(|| Error::config(format!("health server address {address:?} has no port")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::config(format!("health server address {address:?} has an invalid port")))?;
    Ok(format!("http://127.0.0.1:{port}"))
}

/// Query the local health server, succeeding only on HTTP 200.
pub async fn probe(address: &str) -> Result<()> {
    let url = probe_url(address)?;
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let response = client.get(&url).send().await?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::bad_status(
            status.as_u16(),
            crate::provider::utils::to_single_line(&body),
        ));
    }
    Ok(())
}
