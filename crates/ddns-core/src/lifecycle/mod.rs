//! Service lifecycle
//!
//! Every long-lived component (record store, updater, servers, backup)
//! implements [`Service`]. A [`Sequence`] starts them in order, rolls back
//! on a start failure and merges their run errors into one channel.
//!
//! ```text
//! start: database → updater → health → server → backup
//! stop:  server → health → updater → backup → database
//! ```

mod restarter;
mod sequence;

pub use restarter::Restarter;
pub use sequence::Sequence;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A component with an explicit start and stop.
#[async_trait]
pub trait Service: Send {
    /// Name used in logs, errors and stop orders
    fn name(&self) -> &str;

    /// Start the service.
    ///
    /// Returns the receiving end of the service's run-error channel, if it
    /// can fail after a successful start. The channel closes when the
    /// service stops.
    async fn start(&mut self) -> Result<Option<mpsc::Receiver<crate::Error>>>;

    /// Stop the service and wait for its tasks to finish.
    async fn stop(&mut self) -> Result<()>;
}

/// Service that does nothing, used for disabled components.
#[derive(Debug, Clone)]
pub struct Noop {
    name: String,
}

impl Noop {
    /// Create a no-op service
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Service for Noop {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Option<mpsc::Receiver<crate::Error>>> {
        tracing::debug!("{} is disabled", self.name);
        Ok(None)
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
