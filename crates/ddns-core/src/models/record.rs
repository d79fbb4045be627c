//! A managed DNS record and its update state.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use super::history::DISPLAY_TIME_FORMAT;
use super::{History, Status};
use crate::traits::Provider;
use crate::traits::provider::describe;

/// One DNS record: its driver, its history and its current status.
///
/// Records are created once at startup and only mutated by the engine
/// through the record store.
#[derive(Clone)]
pub struct Record {
    /// Driver bound to this record, shared and read-only
    pub provider: Arc<dyn Provider>,
    /// IP history, oldest first
    pub history: History,
    /// Current status
    pub status: Status,
    /// Human readable detail for the status
    pub message: String,
    /// Time of the last status change
    pub time: Option<DateTime<Utc>>,
    /// Start of the current ban, if any
    pub last_ban: Option<DateTime<Utc>>,
}

impl Record {
    /// Create an unset record from its driver and persisted history
    pub fn new(provider: Arc<dyn Provider>, history: History) -> Self {
        Self {
            provider,
            history,
            status: Status::Unset,
            message: String::new(),
            time: None,
            last_ban: None,
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("provider", &describe(self.provider.as_ref()))
            .field("history", &self.history)
            .field("status", &self.status)
            .field("message", &self.message)
            .field("time", &self.time)
            .field("last_ban", &self.last_ban)
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", describe(self.provider.as_ref()), self.status)?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        if let Some(time) = self.time {
            write!(f, " {}", time.format(DISPLAY_TIME_FORMAT))?;
        }
        write!(f, "; {}", self.history)
    }
}
