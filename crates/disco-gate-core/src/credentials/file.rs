use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Duration;
use tracing::{debug, warn};

use super::{CredentialName, CredentialStore, StoreError, StoredSecret};
use crate::clock::{Clock, SystemClock};

/// Credentials file name in the cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// On-disk layout: wire name -> secret with its absolute expiry.
type Document = BTreeMap<CredentialName, StoredSecret>;

/// Credential store backed by a JSON file.
///
/// The whole document is rewritten on every `set`, through a temporary file
/// and a rename, so a concurrent reader sees either the old or the new
/// document and never a partial one.
pub struct FileStore<C = SystemClock> {
    path: PathBuf,
    clock: C,
    write_lock: Mutex<()>,
}

impl FileStore<SystemClock> {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self::with_clock(cache_dir, SystemClock)
    }
}

impl<C: Clock> FileStore<C> {
    pub fn with_clock(cache_dir: PathBuf, clock: C) -> Self {
        Self {
            path: cache_dir.join(CREDENTIALS_FILE),
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Document, StoreError> {
        if !self.path.exists() {
            return Ok(Document::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<C: Clock> CredentialStore for FileStore<C> {
    fn get(&self, name: CredentialName) -> Option<String> {
        match self.load() {
            Ok(document) => document
                .get(&name)
                .and_then(|s| s.live_value(self.clock.now())),
            Err(e) => {
                warn!(error = %e, path = ?self.path, "Failed to read credentials file");
                None
            }
        }
    }

    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        // A corrupt file is replaced rather than blocking every future login
        let mut document = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable credentials file");
            Document::new()
        });

        let now = self.clock.now();
        document.retain(|_, secret| !secret.is_expired(now));
        document.insert(name, StoredSecret::new(value, now, ttl));

        self.save(&document)?;
        debug!(credential = %name, "Credential written to file");
        Ok(())
    }
}
