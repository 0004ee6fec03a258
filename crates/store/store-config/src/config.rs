//! TOML-backed configuration for the owner and reader binaries, layered
//! under the CLI flags defined in the request/reply surface (§6): both
//! binaries accept `--port`, `--size`, and a positional `ipc`/`name`
//! pair, which override whatever a config file supplies.

use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug)]
pub struct StoreConfig {
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default = "defaults::size")]
    pub size: u64,
    #[serde(default = "defaults::ipc")]
    pub ipc: String,
    #[serde(default = "defaults::name")]
    pub name: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn port() -> u16 {
        7777
    }

    pub fn size() -> u64 {
        1 << 24 // 16 MiB
    }

    pub fn ipc() -> String {
        "shm".into()
    }

    pub fn name() -> String {
        "mvcc_store".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            size: defaults::size(),
            ipc: defaults::ipc(),
            name: defaults::name(),
            log_level: defaults::log_level(),
        }
    }
}

impl StoreConfig {
    /// Loads a config file, or falls back to defaults if `path` is
    /// `None` — CLI flags are expected to cover the rest via
    /// [`StoreConfig::apply_overrides`].
    pub fn load(path: Option<impl AsRef<Path> + ToString>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: StoreConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Applies explicit CLI overrides on top of whatever the config file
    /// supplied. `None` leaves the config file's value untouched.
    pub fn apply_overrides(
        &mut self,
        port: Option<u16>,
        size: Option<u64>,
        ipc: Option<String>,
        name: Option<String>,
    ) {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(size) = size {
            self.size = size;
        }
        if let Some(ipc) = ipc {
            self.ipc = ipc;
        }
        if let Some(name) = name {
            self.name = name;
        }
    }
}
