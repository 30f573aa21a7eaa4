//! # kennel configuration
//!
//! A minimal string key/value store (`set` / `get`), plus the typed
//! [`KennelSettings`] the tenant core reads at startup.
//!
//! ```rust
//! use kennel_core::KennelConfig;
//!
//! let mut config = KennelConfig::new();
//! config.set("cache.tenant_ttl", "2h");
//! assert_eq!(config.get("cache.tenant_ttl"), Some("2h"));
//! ```
//!
//! ## Environment overrides
//! `KennelConfig::from_env("KENNEL__")` maps `KENNEL__VAULT__KEY` to
//! `vault.key`: the prefix is stripped, the rest lowercased and `__`
//! becomes `.`.

use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{KennelError, KennelResult};

#[derive(Debug, Default, Clone)]
pub struct KennelConfig {
    values: HashMap<String, String>,
}

impl KennelConfig {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load every variable starting with `prefix` from the process environment.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(std::env::vars(), prefix)
    }

    /// Same as [`KennelConfig::from_env`] over an explicit variable list.
    pub fn from_vars<I>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                config.set(normalized, value);
            }
        }
        config
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn snapshot(&self) -> KennelConfigSnapshot {
        KennelConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct KennelConfigSnapshot {
    map: HashMap<String, String>,
}

impl KennelConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    /// Unlike the lenient getters above, a present but unparsable value is
    /// an error.
    pub fn get_u64(&self, key: &str) -> KennelResult<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                KennelError::configuration(format!("'{}' is not a valid byte count: {}", key, e))
            }),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }

    /// Durations use humantime syntax: `20m`, `2h`, `1h 30m`, `250ms`.
    pub fn get_duration(&self, key: &str) -> KennelResult<Option<Duration>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => humantime::parse_duration(raw.trim())
                .map(Some)
                .map_err(|e| {
                    KennelError::configuration(format!("'{}' is not a valid duration: {}", key, e))
                }),
        }
    }

    fn required(&self, key: &str) -> KennelResult<String> {
        match self.get(key).map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(KennelError::configuration(format!(
                "missing required configuration key '{}'",
                key
            ))),
        }
    }
}

pub const DEFAULT_DB_LIMIT_BYTES: u64 = 500 * 1024 * 1024;
pub const DEFAULT_STORAGE_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

/// Typed settings for the tenant resource core.
#[derive(Debug, Clone)]
pub struct KennelSettings {
    /// Hex encoded 32-byte AES-256-GCM key for BYOD descriptors.
    pub vault_key: String,
    /// HMAC key used to hash inbound credentials.
    pub hash_secret: String,

    pub default_db_uri: String,
    pub connect_timeout: Duration,

    pub default_storage_url: String,
    pub default_storage_key: String,
    pub internal_bucket: String,
    pub external_bucket: String,

    pub tenant_cache_ttl: Duration,
    pub egress_ttl: Duration,
    pub egress_lookup_url: String,

    pub connection_sweep_interval: Duration,
    pub connection_idle: Duration,
    pub storage_sweep_interval: Duration,
    pub storage_idle: Duration,

    pub db_limit_bytes: u64,
    pub storage_limit_bytes: u64,
}

impl KennelSettings {
    pub fn from_config(config: &KennelConfigSnapshot) -> KennelResult<Self> {
        let duration = |key: &str, default: Duration| -> KennelResult<Duration> {
            Ok(config.get_duration(key)?.unwrap_or(default))
        };
        let bytes = |key: &str, default: u64| -> KennelResult<u64> {
            Ok(config.get_u64(key)?.unwrap_or(default))
        };
        let string = |key: &str, default: &str| -> String {
            config
                .get_string(key)
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            vault_key: config.required("vault.key")?,
            hash_secret: config.required("credentials.hash_secret")?,
            default_db_uri: string("docstore.default_uri", "memory://default"),
            connect_timeout: duration("docstore.connect_timeout", Duration::from_secs(10))?,
            default_storage_url: string("storage.default_url", ""),
            default_storage_key: string("storage.default_key", ""),
            internal_bucket: string("storage.internal_bucket", "internal"),
            external_bucket: string("storage.external_bucket", "external"),
            tenant_cache_ttl: duration("cache.tenant_ttl", Duration::from_secs(2 * 60 * 60))?,
            egress_ttl: duration("egress.ttl", Duration::from_secs(60 * 60))?,
            egress_lookup_url: string("egress.lookup_url", "https://api.ipify.org?format=json"),
            connection_sweep_interval: duration(
                "sweeper.connection_interval",
                Duration::from_secs(20 * 60),
            )?,
            connection_idle: duration("sweeper.connection_idle", Duration::from_secs(20 * 60))?,
            storage_sweep_interval: duration(
                "sweeper.storage_interval",
                Duration::from_secs(24 * 60 * 60),
            )?,
            storage_idle: duration("sweeper.storage_idle", Duration::from_secs(24 * 60 * 60))?,
            db_limit_bytes: bytes("quota.db_limit_bytes", DEFAULT_DB_LIMIT_BYTES)?,
            storage_limit_bytes: bytes("quota.storage_limit_bytes", DEFAULT_STORAGE_LIMIT_BYTES)?,
        })
    }
}
