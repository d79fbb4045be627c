//! Per-record update status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a record within the update state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not evaluated yet
    #[default]
    Unset,
    /// A provider update is in flight
    Updating,
    /// The record already points to the public IP
    #[serde(rename = "up to date")]
    UpToDate,
    /// The provider update changed the record
    Success,
    /// The last update failed
    #[serde(rename = "failure")]
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unset => "unset",
            Status::Updating => "updating",
            Status::UpToDate => "up to date",
            Status::Success => "success",
            Status::Fail => "failure",
        };
        f.write_str(s)
    }
}
