// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bus configuration plus the storage port it is loaded through.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Per-registrar settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Initial debug flag for channels created by the registrar.
    pub debug: bool,
    /// Whether `publish` calls are reported to trace observers.
    pub trace_publishers: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            debug: false,
            trace_publishers: true,
        }
    }
}

impl Settings for BusConfig {
    const KEY: &'static str = "bus";
}

/// A settings record stored under a fixed key and checked before use.
pub trait Settings: Serialize + DeserializeOwned + Default {
    /// Store key the record lives under.
    const KEY: &'static str;

    /// Rejects values the consumer cannot run with.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Storage port for raw settings blobs, keyed by [`Settings::KEY`] or any
/// other logical name.
pub trait ConfigStore {
    /// Raw blob for `key`; [`ConfigError::NotFound`] when absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Stores `data` under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Failure loading or saving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No blob under the key.
    #[error("not found")]
    NotFound,
    /// Store I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The blob is not valid JSON for the requested type.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The value decoded but failed [`Settings::validate`].
    #[error("invalid `{key}` settings: {reason}")]
    Invalid {
        /// Store key.
        key: String,
        /// What the check rejected.
        reason: String,
    },
    /// Store-specific failure.
    #[error("other: {0}")]
    Other(String),
}

/// JSON codec plus validation in front of a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Decodes the blob under `key`; `Ok(None)` when it is missing or empty.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encodes `value` as pretty JSON under `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Loads `T` from [`Settings::KEY`], falling back to `T::default()` when
    /// the key is missing, and validates the result.
    pub fn load_settings<T: Settings>(&self) -> Result<T, ConfigError> {
        let stored = self.load::<T>(T::KEY)?;
        let found = stored.is_some();
        let value = stored.unwrap_or_default();
        check(&value)?;
        tracing::debug!(key = T::KEY, found, "settings loaded");
        Ok(value)
    }

    /// Validates `value`, then stores it under [`Settings::KEY`].
    pub fn save_settings<T: Settings>(&self, value: &T) -> Result<(), ConfigError> {
        check(value)?;
        self.save(T::KEY, value)
    }
}

fn check<T: Settings>(value: &T) -> Result<(), ConfigError> {
    value.validate().map_err(|reason| {
        tracing::warn!(key = T::KEY, %reason, "settings rejected");
        ConfigError::Invalid {
            key: T::KEY.to_owned(),
            reason,
        }
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bus_settings_accept_any_flags() {
        assert_eq!(BusConfig::KEY, "bus");
        assert!(BusConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: BusConfig = serde_json::from_str(r#"{"debug": true}"#).unwrap();
        assert!(cfg.debug);
        assert!(cfg.trace_publishers);
    }
}
