//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which names
//! the backend to renew sessions against, the renewal timeout, where
//! credentials are kept, and the route table.
//!
//! Configuration is stored at `~/.config/disco-gate/config.json`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::REQUEST_TIMEOUT_SECS;
use crate::gate::GateConfig;
use crate::routes::{Destination, Routes};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "disco-gate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the Disco backend listens in a default local setup
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

pub const ENV_API_BASE_URL: &str = "DISCO_API_BASE_URL";
pub const ENV_RENEWAL_TIMEOUT_SECS: &str = "DISCO_RENEWAL_TIMEOUT_SECS";

/// Where the session secrets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "keyring" => Ok(CredentialBackend::Keyring),
            "file" => Ok(CredentialBackend::File),
            "memory" => Ok(CredentialBackend::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown credential backend '{}' (expected keyring, file or memory)",
                other
            )),
        }
    }
}

impl fmt::Display for CredentialBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialBackend::Keyring => "keyring",
            CredentialBackend::File => "file",
            CredentialBackend::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub renewal_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub destinations: Vec<Destination>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            renewal_timeout_secs: REQUEST_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            destinations: Routes::default_destinations(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file credential backend.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; split out so tests need not
    /// touch the real environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(secs) = lookup(ENV_RENEWAL_TIMEOUT_SECS) {
            self.renewal_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_RENEWAL_TIMEOUT_SECS, secs))?;
        }
        Ok(())
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs.max(1))
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            renewal_timeout: self.renewal_timeout(),
        }
    }

    pub fn routes(&self) -> Result<Routes> {
        Routes::new(self.destinations.clone()).context("Invalid route table in config")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("disco-gate-config-does-not-exist.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.renewal_timeout(), Duration::from_secs(30));
        assert_eq!(config.credential_backend, CredentialBackend::Keyring);
        assert_eq!(config.routes().unwrap().iter().count(), 3);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api_base_url":"https://disco.example","credential_backend":"file"}"#)
                .unwrap();
        assert_eq!(config.api_base_url, "https://disco.example");
        assert_eq!(config.credential_backend, CredentialBackend::File);
        assert_eq!(config.renewal_timeout_secs, REQUEST_TIMEOUT_SECS);
        assert!(config.routes().unwrap().get("home").is_some());
    }

    #[test]
    fn test_custom_destinations() {
        let config: Config = serde_json::from_str(
            r#"{"destinations":[{"name":"feed","requires_auth":true},{"name":"login"}]}"#,
        )
        .unwrap();
        let routes = config.routes().unwrap();
        assert!(routes.get("feed").unwrap().is_protected());
        assert!(routes.get("home").is_none());
    }

    #[test]
    fn test_route_table_without_login_is_rejected() {
        let config: Config =
            serde_json::from_str(r#"{"destinations":[{"name":"feed","requires_auth":true}]}"#).unwrap();
        assert!(config.routes().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_BASE_URL, "http://127.0.0.1:9000"),
            (ENV_RENEWAL_TIMEOUT_SECS, " 5 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.gate_config().renewal_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_timeout_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|key| (key == ENV_RENEWAL_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_RENEWAL_TIMEOUT_SECS));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("Keyring".parse::<CredentialBackend>().unwrap(), CredentialBackend::Keyring);
        assert_eq!("file".parse::<CredentialBackend>().unwrap(), CredentialBackend::File);
        assert_eq!("memory".parse::<CredentialBackend>().unwrap(), CredentialBackend::Memory);
        assert!("cookie".parse::<CredentialBackend>().is_err());
    }
}
