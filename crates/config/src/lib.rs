use core::time::Duration;
use std::fs::{read_to_string, write};

use camino::Utf8Path;
use custos_client::resilient::{DEFAULT_CONNECTION_FULL_RETRY_TOTAL, DEFAULT_RPC_RETRY_TOTAL};
use custos_client::RetryPolicy;
use custos_primitives::{Endpoint, EndpointError, DEFAULT_RPC_PORT};
use custos_store::config::DEFAULT_DELTA_RETENTION;
use custos_store::StoreConfig;
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "custos.toml";

/// Connect timeout used when none is configured.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(200_000);

#[derive(Debug, Default, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Comma-separated `host[:port]` list.
    pub servers: String,
    pub default_port: u16,
    pub rpc_retry_total: u32,
    pub connection_full_retry_total: u32,
    #[serde(rename = "connection_timeout_ms", with = "serde_duration")]
    pub connection_timeout: Duration,
    pub secure_channel_required: bool,
}

impl ClientConfig {
    #[must_use]
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            ..Self::default()
        }
    }

    pub fn endpoints(&self) -> Result<Vec<Endpoint>, EndpointError> {
        Endpoint::parse_list(&self.servers, self.default_port)
    }

    /// Retry limits, with each call bounded by the connection timeout.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.rpc_retry_total, self.connection_full_retry_total)
            .with_call_timeout(self.connection_timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: String::new(),
            default_port: DEFAULT_RPC_PORT,
            rpc_retry_total: DEFAULT_RPC_RETRY_TOTAL,
            connection_full_retry_total: DEFAULT_CONNECTION_FULL_RETRY_TOTAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            secure_channel_required: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ServiceConfig {
    /// Deltas kept per domain before consumers fall back to a full image.
    pub delta_retention: usize,
    /// Signal names (e.g. `SIGUSR2`) that force a full resync.
    pub resync_signals: Vec<String>,
}

impl ServiceConfig {
    #[must_use]
    pub const fn store(&self) -> StoreConfig {
        StoreConfig::new(self.delta_retention)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            delta_retention: DEFAULT_DELTA_RETENTION,
            resync_signals: Vec::new(),
        }
    }
}

impl ConfigFile {
    #[must_use]
    pub const fn new(client: ClientConfig, service: ServiceConfig) -> Self {
        Self { client, service }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration at {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }

    /// Only write config file if changes are detected
    pub fn save_if_changed(&self, dir: &Utf8Path) -> EyreResult<bool> {
        let path = dir.join(CONFIG_FILE);
        let new_content = toml::to_string_pretty(self)?;

        let changed = match read_to_string(&path) {
            Ok(existing) => existing != new_content,
            Err(_) => true,
        };

        if changed {
            write(&path, new_content)
                .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;
        }

        Ok(changed)
    }
}

mod serde_duration {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
