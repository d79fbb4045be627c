//! Data model shared by the persistence layer, the record store and the engine.

pub mod history;
pub mod ip_version;
pub mod record;
pub mod status;

pub use history::{History, HistoryEvent};
pub use ip_version::IpVersion;
pub use record::Record;
pub use status::Status;
