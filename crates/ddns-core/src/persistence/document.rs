//! On-disk representation of the IP histories (`updates.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::models::{History, HistoryEvent, IpVersion};

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentDocument {
    /// One entry per (domain, owner, ip version)
    #[serde(default)]
    pub records: Vec<PersistedRecord>,
}

/// History of one record as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Registered domain
    pub domain: String,
    /// Owner label; older documents call it `host`
    #[serde(alias = "host")]
    pub owner: String,
    /// Tracked IP version
    #[serde(default)]
    pub ip_version: IpVersion,
    /// Events, oldest first
    #[serde(default)]
    pub events: Vec<HistoryEvent>,
}

impl PersistentDocument {
    /// Parse a document; empty content is an empty document.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content)
            .map_err(|e| Error::persistence(format!("cannot decode document: {e}")))
    }

    /// Verify the invariants every stored record must satisfy.
    pub fn check(&self) -> Result<()> {
        for (i, record) in self.records.iter().enumerate() {
            if record.domain.is_empty() {
                return Err(Error::persistence(format!("record {i}: domain is empty")));
            }
            if record.owner.is_empty() {
                return Err(Error::persistence(format!(
                    "record {i} for domain {}: owner is empty",
                    record.domain
                )));
            }
            let mut previous: Option<DateTime<Utc>> = None;
            for (j, event) in record.events.iter().enumerate() {
                if event.time <= DateTime::<Utc>::UNIX_EPOCH {
                    return Err(Error::persistence(format!(
                        "record {i} for domain {}: event {j} has a zero time",
                        record.domain
                    )));
                }
                if event.ip.is_unspecified() {
                    return Err(Error::persistence(format!(
                        "record {i} for domain {}: event {j} has an unspecified IP address",
                        record.domain
                    )));
                }
                if let Some(previous) = previous
                    && event.time < previous
                {
                    return Err(Error::persistence(format!(
                        "record {i} for domain {}: event {j} at {} is older than the previous event at {}",
                        record.domain, event.time, previous
                    )));
                }
                previous = Some(event.time);
            }
        }
        Ok(())
    }

    /// History of the matching record, empty if absent.
    pub fn history(&self, domain: &str, owner: &str, ip_version: IpVersion) -> History {
        self.find(domain, owner, ip_version)
            .map(|i| History::new(self.records[i].events.clone()))
            .unwrap_or_default()
    }

    /// Append an event to the matching record, creating it when missing.
    pub fn append(
        &mut self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
        ip: IpAddr,
        time: DateTime<Utc>,
    ) {
        let event = HistoryEvent::new(ip, time);
        match self.find(domain, owner, ip_version) {
            Some(i) => self.records[i].events.push(event),
            None => self.records.push(PersistedRecord {
                domain: domain.to_string(),
                owner: owner.to_string(),
                ip_version,
                events: vec![event],
            }),
        }
    }

    fn find(&self, domain: &str, owner: &str, ip_version: IpVersion) -> Option<usize> {
        self.records.iter().position(|r| {
            r.domain == domain && r.owner == owner && r.ip_version == ip_version
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn empty_content_is_empty_document() {
        assert_eq!(PersistentDocument::parse("").unwrap(), PersistentDocument::default());
        assert_eq!(
            PersistentDocument::parse("  \n").unwrap(),
            PersistentDocument::default()
        );
    }

    #[test]
    fn legacy_host_field_is_read_as_owner() {
        let doc = PersistentDocument::parse(
            r#"{"records":[{"domain":"example.com","host":"www","ip_version":"ipv4",
            "events":[{"ip":"203.0.113.5","time":"2024-01-01T00:00:00Z"}]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.records[0].owner, "www");
        doc.check().unwrap();
    }

    #[test]
    fn check_rejects_decreasing_times() {
        let mut doc = PersistentDocument::default();
        let ip = IpAddr::from([203, 0, 113, 5]);
        doc.append("example.com", "@", IpVersion::Ipv4, ip, at(10));
        doc.append("example.com", "@", IpVersion::Ipv4, ip, at(5));
        assert!(doc.check().is_err());
    }

    #[test]
    fn check_rejects_zero_times() {
        for time in ["0001-01-01T00:00:00Z", "1970-01-01T00:00:00Z"] {
            let doc = PersistentDocument::parse(&format!(
                r#"{{"records":[{{"domain":"example.com","owner":"@","ip_version":"ipv4",
                "events":[{{"ip":"203.0.113.5","time":"{time}"}}]}}]}}"#
            ))
            .unwrap();
            let err = doc.check().unwrap_err();
            assert!(err.to_string().ends_with("event 0 has a zero time"), "{time}: {err}");
        }
    }

    #[test]
    fn check_rejects_blank_owner() {
        let mut doc = PersistentDocument::default();
        doc.append("example.com", "", IpVersion::Ipv4, IpAddr::from([1, 2, 3, 4]), at(1));
        assert!(doc.check().is_err());
    }

    #[test]
    fn append_keys_on_ip_version() {
        let mut doc = PersistentDocument::default();
        let v4 = IpAddr::from([203, 0, 113, 5]);
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        doc.append("example.com", "@", IpVersion::Ipv4, v4, at(1));
        doc.append("example.com", "@", IpVersion::Ipv6, v6, at(2));
        doc.append("example.com", "@", IpVersion::Ipv4, v4, at(3));
        assert_eq!(doc.records.len(), 2);
        assert_eq!(doc.history("example.com", "@", IpVersion::Ipv4).len(), 2);
        assert_eq!(
            doc.history("example.com", "@", IpVersion::Ipv6).current_ip(),
            Some(v6)
        );
        assert!(doc.history("example.com", "www", IpVersion::Ipv4).is_empty());
    }
}
