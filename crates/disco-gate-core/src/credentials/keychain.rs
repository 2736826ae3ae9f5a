use chrono::Duration;
use keyring::Entry;
use tracing::{debug, warn};

use super::{CredentialName, CredentialStore, StoreError, StoredSecret};
use crate::clock::{Clock, SystemClock};

const SERVICE_NAME: &str = "disco-gate";

/// Credential store backed by the OS keychain.
///
/// The keychain has no notion of expiry, so each entry holds a small JSON
/// document with the secret and its absolute expiration.
pub struct KeyringStore<C = SystemClock> {
    service: String,
    clock: C,
}

impl KeyringStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME, SystemClock)
    }
}

impl Default for KeyringStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> KeyringStore<C> {
    pub fn with_service(service: &str, clock: C) -> Self {
        Self {
            service: service.to_string(),
            clock,
        }
    }

    fn entry(&self, name: CredentialName) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, name.as_str())?)
    }

    fn read(&self, name: CredentialName) -> Result<Option<StoredSecret>, StoreError> {
        match self.entry(name)?.get_password() {
            Ok(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl<C: Clock> CredentialStore for KeyringStore<C> {
    fn get(&self, name: CredentialName) -> Option<String> {
        match self.read(name) {
            Ok(secret) => secret.and_then(|s| s.live_value(self.clock.now())),
            Err(e) => {
                warn!(error = %e, credential = %name, "Failed to read credential from keychain");
                None
            }
        }
    }

    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secret = StoredSecret::new(value, self.clock.now(), ttl);
        let payload = serde_json::to_string(&secret)?;
        self.entry(name)?.set_password(&payload)?;
        debug!(credential = %name, expires_at = %secret.expires_at, "Credential stored in keychain");
        Ok(())
    }
}
