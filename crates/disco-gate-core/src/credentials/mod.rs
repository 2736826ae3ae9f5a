//! Credential storage for the two session secrets.
//!
//! This module provides:
//! - `CredentialStore`: the get/set-with-TTL capability the gate depends on
//! - `MemoryStore`: in-process store, used by tests and throwaway sessions
//! - `FileStore`: JSON document in the user's cache directory
//! - `KeyringStore`: secure OS-level storage via keyring
//!
//! Every secret carries its own absolute expiration. A read after that
//! instant behaves exactly like a read of a secret that was never written.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod file;
pub mod keychain;
pub mod memory;

pub use self::file::FileStore;
pub use self::keychain::KeyringStore;
pub use self::memory::MemoryStore;

/// The two secrets a session is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialName {
    AccessToken,
    RefreshToken,
}

impl CredentialName {
    pub const ALL: [CredentialName; 2] = [CredentialName::AccessToken, CredentialName::RefreshToken];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialName::AccessToken => "access_token",
            CredentialName::RefreshToken => "refresh_token",
        }
    }

    /// Parse a stored key name. Only the two wire names are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "access_token" => Some(CredentialName::AccessToken),
            "refresh_token" => Some(CredentialName::RefreshToken),
            _ => None,
        }
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// TTL-bearing key/value access to the session secrets.
///
/// Calls are synchronous from the caller's point of view even when the
/// backing medium lives outside the process.
pub trait CredentialStore: Send + Sync {
    /// Returns the secret if present and not expired.
    fn get(&self, name: CredentialName) -> Option<String>;

    /// Stores `value` with an absolute expiration of `now + ttl`, replacing
    /// any previous value under `name`.
    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn get(&self, name: CredentialName) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(name, value, ttl)
    }
}

impl<S: CredentialStore + ?Sized> CredentialStore for Box<S> {
    fn get(&self, name: CredentialName) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: CredentialName, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(name, value, ttl)
    }
}

/// A secret together with the instant it stops being readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSecret {
    /// Expiry saturates at the ends of the representable range rather than
    /// overflowing.
    pub fn new(value: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = now.checked_add_signed(ttl).unwrap_or(if ttl < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            value: value.to_string(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The value, if it is still live at `now`.
    pub fn live_value(&self, now: DateTime<Utc>) -> Option<String> {
        if self.is_expired(now) {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_name_round_trip() {
        for name in CredentialName::ALL {
            assert_eq!(CredentialName::from_name(name.as_str()), Some(name));
        }
        assert_eq!(CredentialName::from_name("session"), None);
        assert_eq!(CredentialName::from_name("ACCESS_TOKEN"), None);
    }

    #[test]
    fn test_credential_name_serializes_as_wire_name() {
        let json = serde_json::to_string(&CredentialName::RefreshToken).unwrap();
        assert_eq!(json, "\"refresh_token\"");
    }

    #[test]
    fn test_stored_secret_expiry_boundary() {
        let now = Utc::now();
        let secret = StoredSecret::new("T", now, Duration::seconds(60));

        assert_eq!(secret.live_value(now).as_deref(), Some("T"));
        assert_eq!(
            secret.live_value(now + Duration::seconds(59)).as_deref(),
            Some("T")
        );
        // The expiration instant itself is already expired
        assert!(secret.live_value(now + Duration::seconds(60)).is_none());
    }

    #[test]
    fn test_stored_secret_non_positive_ttl_is_never_live() {
        let now = Utc::now();
        assert!(StoredSecret::new("T", now, Duration::zero()).is_expired(now));
        assert!(StoredSecret::new("T", now, Duration::seconds(-5)).is_expired(now));
    }

    #[test]
    fn test_stored_secret_huge_ttl_saturates() {
        let now = Utc::now();
        let secret = StoredSecret::new("T", now, Duration::MAX);
        assert_eq!(secret.expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(secret.live_value(now).as_deref(), Some("T"));

        let secret = StoredSecret::new("T", now, Duration::MIN);
        assert_eq!(secret.expires_at, DateTime::<Utc>::MIN_UTC);
        assert!(secret.is_expired(now));
    }
}
