// # JSON History Store
//
// File-based implementation of HistoryStore (`<DATADIR>/updates.json`).
//
// ## Durability
//
// - Every append rewrites the whole document, indented
// - Atomic writes: the document goes to a `.tmp` file which is then renamed
// - Writes are serialized by a single mutex
// - No file handle is held between calls
//
// ## Integrity
//
// The document is checked when the store is opened. A document that fails
// the check (blank domain or owner, zero time, unspecified IP, events out of
// order) is refused: the daemon must not start on top of it.
//
// ## File Format
//
// ```json
// {
//   "records": [
//     {
//       "domain": "example.com",
//       "owner": "@",
//       "ip_version": "ipv4",
//       "events": [
//         { "ip": "203.0.113.5", "time": "2025-01-09T12:00:00Z" }
//       ]
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::PersistentDocument;
use crate::error::{Error, Result};
use crate::models::{History, IpVersion};
use crate::traits::HistoryStore;

/// File name of the document inside the data directory.
pub const FILE_NAME: &str = "updates.json";

/// File-based history store.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::persistence::JsonHistoryStore;
/// use ddns_core::traits::HistoryStore;
/// use ddns_core::models::IpVersion;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = JsonHistoryStore::open("/var/lib/ddns").await?;
///
///     store
///         .store_new_ip("example.com", "@", IpVersion::Ipv4, "203.0.113.5".parse()?, chrono::Utc::now())
///         .await?;
///
///     let history = store.get_events("example.com", "@", IpVersion::Ipv4).await?;
///     assert_eq!(history.current_ip(), Some("203.0.113.5".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    document: PersistentDocument,
    closed: bool,
}

impl JsonHistoryStore {
    /// Open (or create) `updates.json` inside `data_dir`.
    ///
    /// This will:
    /// 1. Create the data directory if needed
    /// 2. Create an empty document if the file does not exist
    /// 3. Load and check the existing document otherwise
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref();
        create_private_dir(dir).await?;
        let path = dir.join(FILE_NAME);

        let document = match fs::read_to_string(&path).await {
            Ok(content) => {
                let document = PersistentDocument::parse(&content)?;
                document.check().map_err(|e| {
                    Error::persistence(format!("{} failed integrity check: {e}", path.display()))
                })?;
                tracing::debug!(
                    "Loaded {} record histories from {}",
                    document.records.len(),
                    path.display()
                );
                document
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("{} does not exist, creating it", path.display());
                let document = PersistentDocument::default();
                write_document(&path, &document).await?;
                document
            }
            Err(e) => {
                return Err(Error::persistence(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(State {
                document,
                closed: false,
            }),
        })
    }

    /// Path of the document on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn get_events(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
    ) -> Result<History> {
        let state = self.state.lock().await;
        Ok(state.document.history(domain, owner, ip_version))
    }

    async fn store_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip_version: IpVersion,
        ip: IpAddr,
        time: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::persistence("history store is closed"));
        }
        state.document.append(domain, owner, ip_version, ip, time);
        write_document(&self.path, &state.document).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        Ok(())
    }
}

/// Create `dir` (and parents) readable by the owner only.
async fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await.map_err(|e| {
        Error::persistence(format!("failed to create directory {}: {e}", dir.display()))
    })
}

/// Write the document atomically (temp file then rename), mode 0600.
async fn write_document(path: &Path, document: &PersistentDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(document)
        .map_err(|e| Error::persistence(format!("failed to encode document: {e}")))?;

    let mut temp_path = path.to_path_buf();
    temp_path.set_extension("json.tmp");
    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&temp_path).await.map_err(|e| {
            Error::persistence(format!("failed to create {}: {e}", temp_path.display()))
        })?;
        file.write_all(json.as_bytes()).await.map_err(|e| {
            Error::persistence(format!("failed to write {}: {e}", temp_path.display()))
        })?;
        file.flush().await.map_err(|e| {
            Error::persistence(format!("failed to flush {}: {e}", temp_path.display()))
        })?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::persistence(format!(
            "failed to rename {} to {}: {e}",
            temp_path.display(),
            path.display()
        ))
    })?;

    tracing::trace!("History written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_created_empty() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");

        let store = JsonHistoryStore::open(&data_dir).await.unwrap();
        assert!(store.path().exists());

        let history = store
            .get_events("example.com", "@", IpVersion::Ipv4)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn reopen_yields_same_document() {
        let dir = tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).await.unwrap();

        let first = IpAddr::from([203, 0, 113, 5]);
        let second = IpAddr::from([203, 0, 113, 9]);
        store
            .store_new_ip("example.com", "@", IpVersion::Ipv4, first, at(0))
            .await
            .unwrap();
        store
            .store_new_ip("example.com", "@", IpVersion::Ipv4, second, at(60))
            .await
            .unwrap();
        store
            .store_new_ip("example.com", "www", IpVersion::Ipv6, "2001:db8::1".parse().unwrap(), at(5))
            .await
            .unwrap();
        store.close().await.unwrap();

        let before = PersistentDocument::parse(
            &std::fs::read_to_string(store.path()).unwrap(),
        )
        .unwrap();

        let reopened = JsonHistoryStore::open(dir.path()).await.unwrap();
        let after = reopened.state.lock().await.document.clone();
        assert_eq!(before, after);

        let history = reopened
            .get_events("example.com", "@", IpVersion::Ipv4)
            .await
            .unwrap();
        assert_eq!(history.current_ip(), Some(second));
        assert_eq!(history.previous_ips(), vec![first]);
    }

    #[tokio::test]
    async fn corrupted_document_is_refused() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), b"{ not json").unwrap();
        assert!(JsonHistoryStore::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn out_of_order_document_is_refused() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(FILE_NAME),
            r#"{"records":[{"domain":"example.com","owner":"@","ip_version":"ipv4","events":[
                {"ip":"203.0.113.5","time":"2024-01-02T00:00:00Z"},
                {"ip":"203.0.113.9","time":"2024-01-01T00:00:00Z"}]}]}"#,
        )
        .unwrap();
        assert!(JsonHistoryStore::open(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn empty_file_is_accepted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), b"").unwrap();
        let store = JsonHistoryStore::open(dir.path()).await.unwrap();
        let history = store
            .get_events("example.com", "@", IpVersion::Ipv4)
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let dir = tempdir().unwrap();
        let store = JsonHistoryStore::open(dir.path()).await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();
        let result = store
            .store_new_ip("example.com", "@", IpVersion::Ipv4, IpAddr::from([1, 2, 3, 4]), at(1))
            .await;
        assert!(result.is_err());
    }
}
