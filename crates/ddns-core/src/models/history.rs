//! Append-only IP history of a record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Number of previous IPs shown before collapsing into "(N more)".
const MAX_PREVIOUS_DISPLAYED: usize = 4;

/// Format used for human readable timestamps.
pub(crate) const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// One IP change, immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// The IP address the record pointed to from `time` on
    pub ip: IpAddr,
    /// When the change was recorded
    pub time: DateTime<Utc>,
}

impl HistoryEvent {
    /// Create a new history event
    pub fn new(ip: IpAddr, time: DateTime<Utc>) -> Self {
        Self { ip, time }
    }
}

/// Ordered IP history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<HistoryEvent>);

impl History {
    /// Create a history from already ordered events
    pub fn new(events: Vec<HistoryEvent>) -> Self {
        Self(events)
    }

    /// All events, oldest first
    pub fn events(&self) -> &[HistoryEvent] {
        &self.0
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no event was recorded yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append an event at the end of the history
    pub fn push(&mut self, event: HistoryEvent) {
        self.0.push(event);
    }

    /// Last appended event
    pub fn last(&self) -> Option<&HistoryEvent> {
        self.0.last()
    }

    /// IP of the last event, if any
    pub fn current_ip(&self) -> Option<IpAddr> {
        self.0.last().map(|event| event.ip)
    }

    /// IPs of every event except the last, oldest first
    pub fn previous_ips(&self) -> Vec<IpAddr> {
        match self.0.split_last() {
            Some((_, previous)) => previous.iter().map(|event| event.ip).collect(),
            None => Vec::new(),
        }
    }

    /// Time of the last event, if any
    pub fn success_time(&self) -> Option<DateTime<Utc>> {
        self.0.last().map(|event| event.time)
    }

    /// Coarse duration since the last success, e.g. `42s`, `5m`, `3h`, `12d`.
    ///
    /// Returns `None` for an empty history.
    pub fn duration_since_success(&self, now: DateTime<Utc>) -> Option<String> {
        let success = self.success_time()?;
        Some(format_coarse_duration(now - success))
    }
}

/// Round `duration` to the closest unit among seconds, minutes, hours and days.
pub fn format_coarse_duration(duration: chrono::Duration) -> String {
    const SECOND: i64 = 1_000;
    const MINUTE: i64 = 60 * SECOND;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    let millis = duration.num_milliseconds().max(0);
    let rounded = |unit: i64| (millis + unit / 2) / unit;
    match millis {
        m if m < MINUTE => format!("{}s", rounded(SECOND)),
        m if m < HOUR => format!("{}m", rounded(MINUTE)),
        m if m < DAY => format!("{}h", rounded(HOUR)),
        _ => format!("{}d", rounded(DAY)),
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(last) = self.last() else {
            return Ok(());
        };
        write!(
            f,
            "Last success update: {}; IP: {}",
            last.time.format(DISPLAY_TIME_FORMAT),
            last.ip
        )?;

        let previous = self.previous_ips();
        if previous.is_empty() {
            return Ok(());
        }
        let mut shown: Vec<String> = previous
            .iter()
            .take(MAX_PREVIOUS_DISPLAYED)
            .map(ToString::to_string)
            .collect();
        if previous.len() > MAX_PREVIOUS_DISPLAYED {
            shown.push(format!(
                "...({} more)",
                previous.len() - MAX_PREVIOUS_DISPLAYED
            ));
        }
        write!(f, "; Previous IPs: {}", shown.join(","))
    }
}
