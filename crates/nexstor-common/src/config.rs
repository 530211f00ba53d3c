//! Client configuration
//!
//! Loaded from an optional TOML file layered under `NEXSTOR__`-prefixed
//! environment variables (`NEXSTOR__APPLIANCE__USERNAME=admin`).

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "NEXSTOR";

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub appliance: ApplianceConfig,
    pub client: ClientConfig,
}

/// How to reach and authenticate against the appliance
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplianceConfig {
    /// Base URLs of the management API, tried in order on connection failure
    #[serde(deserialize_with = "deserialize_addresses")]
    pub addresses: Vec<String>,
    pub username: String,
    pub password: String,
    /// Accept self-signed certificates
    pub insecure_skip_verify: bool,
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["https://127.0.0.1:8443".to_string()],
            username: "admin".to_string(),
            password: String::new(),
            insecure_skip_verify: false,
        }
    }
}

impl std::fmt::Debug for ApplianceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplianceConfig")
            .field("addresses", &self.addresses)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

/// Request and job timing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub request_timeout_ms: u64,
    pub job_poll_interval_ms: u64,
    pub job_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            job_poll_interval_ms: 1_000,
            job_timeout_ms: 300_000,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }
}

/// Configuration loading or validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            let file = ::config::File::from(path).required(true);
            builder = builder.add_source(file);
        }
        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.appliance.addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "appliance.addresses must list at least one address".to_string(),
            ));
        }
        for address in &self.appliance.addresses {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "appliance address '{address}' must start with http:// or https://"
                )));
            }
        }
        if self.client.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "client.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated address list, dropping blanks
#[must_use]
pub fn split_addresses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

fn deserialize_addresses<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Addresses {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Addresses::deserialize(deserializer)? {
        Addresses::Joined(raw) => split_addresses(&raw),
        Addresses::List(list) => list
            .iter()
            .flat_map(|entry| split_addresses(entry))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client.job_poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_split_addresses() {
        assert_eq!(
            split_addresses(" https://a:8443/, ,https://b:8443"),
            vec!["https://a:8443", "https://b:8443"]
        );
        assert!(split_addresses("").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[appliance]
addresses = "https://10.0.0.1:8443,https://10.0.0.2:8443"
username = "operator"
password = "secret"
insecure_skip_verify = true

[client]
job_timeout_ms = 5000
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.appliance.addresses.len(), 2);
        assert_eq!(config.appliance.username, "operator");
        assert!(config.appliance.insecure_skip_verify);
        assert_eq!(config.client.job_timeout_ms, 5000);
        assert_eq!(config.client.request_timeout_ms, 30_000);
        assert!(!format!("{:?}", config.appliance).contains("secret"));
    }

    #[test]
    fn test_address_list_form() {
        let config: Config = serde_json::from_str(
            r#"{"appliance":{"addresses":["https://a:8443","https://b:8443,https://c:8443"]}}"#,
        )
        .unwrap();
        assert_eq!(config.appliance.addresses.len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_addresses() {
        let mut config = Config::default();
        config.appliance.addresses = vec!["10.0.0.1:8443".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.appliance.addresses.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Load(_))
        ));
    }
}
