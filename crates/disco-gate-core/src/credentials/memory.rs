use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Duration;

use super::{CredentialName, CredentialStore, StoreError, StoredSecret};
use crate::clock::{Clock, SystemClock};

/// Process-local credential store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore<C = SystemClock> {
    clock: C,
    secrets: Mutex<HashMap<CredentialName, StoredSecret>>,
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            secrets: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Clock> CredentialStore for MemoryStore<C> {
    fn get(&self, name: CredentialName) -> Option<String> {
        let now = self.clock.now();
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.get(&name).and_then(|s| s.live_value(now))
    }

    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let secret = StoredSecret::new(value, self.clock.now(), ttl);
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.insert(name, secret);
        Ok(())
    }
}
