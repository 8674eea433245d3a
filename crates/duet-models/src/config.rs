use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration for duet.
///
/// Every section and field has a default, so an empty TOML file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuetConfig {
    pub memory: MemoryConfig,
    pub redis: RedisConfig,
    pub server: ServerConfig,
}

/// Configuration for the unified memory coordinator and its stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database file. Parent directories are created.
    pub sqlite_path: String,
    /// Prefix for every cache key.
    pub namespace: String,
    pub market_data_ttl_seconds: u64,
    pub agent_decision_ttl_seconds: u64,
    pub trading_signal_ttl_seconds: u64,
    pub system_state_ttl_seconds: u64,
    /// Seconds between cleanup sweeps. 0 disables the background loop.
    pub cleanup_interval_seconds: u64,
    /// Retention for market data and processed events.
    pub days_to_keep: u32,
    /// Run cleanup sweeps on the blocking thread pool instead of inline.
    pub enable_async: bool,
    /// Initial sizing hint for the in-process cache. Not a hard cap.
    pub max_cache_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/duet_memory.db".to_string(),
            namespace: "duet_shared".to_string(),
            market_data_ttl_seconds: 3600,
            agent_decision_ttl_seconds: 1800,
            trading_signal_ttl_seconds: 900,
            system_state_ttl_seconds: 300,
            cleanup_interval_seconds: 3600,
            days_to_keep: 7,
            enable_async: true,
            max_cache_size: 10_000,
        }
    }
}

impl MemoryConfig {
    pub fn market_data_ttl(&self) -> Duration {
        Duration::from_secs(self.market_data_ttl_seconds)
    }

    pub fn agent_decision_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_decision_ttl_seconds)
    }

    pub fn trading_signal_ttl(&self) -> Duration {
        Duration::from_secs(self.trading_signal_ttl_seconds)
    }

    pub fn system_state_ttl(&self) -> Duration {
        Duration::from_secs(self.system_state_ttl_seconds)
    }

    /// `None` when the background loop is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_seconds > 0)
            .then(|| Duration::from_secs(self.cleanup_interval_seconds))
    }
}

/// Connection settings for the external cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    /// When false the in-process cache is used without trying to connect.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    /// Budget for the initial connect + PING before falling back.
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            connect_timeout_ms: 500,
        }
    }
}

impl RedisConfig {
    /// `redis://[:password@]host:port/db`
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{password}@{}:{}/{}", self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// REST facade bind address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("namespace must not contain ':' (got {0:?})")]
    NamespaceSeparator(String),
}

impl DuetConfig {
    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate()?;
        if self.redis.enabled && self.redis.port == 0 {
            return Err(ConfigError::Zero { field: "redis.port" });
        }
        if self.server.port == 0 {
            return Err(ConfigError::Zero { field: "server.port" });
        }
        Ok(())
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sqlite_path.trim().is_empty() {
            return Err(ConfigError::Empty { field: "memory.sqlite_path" });
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::Empty { field: "memory.namespace" });
        }
        if self.namespace.contains(':') {
            return Err(ConfigError::NamespaceSeparator(self.namespace.clone()));
        }
        let ttls = [
            ("memory.market_data_ttl_seconds", self.market_data_ttl_seconds),
            ("memory.agent_decision_ttl_seconds", self.agent_decision_ttl_seconds),
            ("memory.trading_signal_ttl_seconds", self.trading_signal_ttl_seconds),
            ("memory.system_state_ttl_seconds", self.system_state_ttl_seconds),
        ];
        for (field, value) in ttls {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.days_to_keep == 0 {
            return Err(ConfigError::Zero { field: "memory.days_to_keep" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_duet_config() {
        let config = DuetConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: DuetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: DuetConfig = toml::from_str("").unwrap();
        assert_eq!(config, DuetConfig::default());
        assert_eq!(config.memory.namespace, "duet_shared");
        assert_eq!(config.memory.market_data_ttl(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[memory]
sqlite_path = "/tmp/duet_test.db"
namespace = "desk1"
trading_signal_ttl_seconds = 60
cleanup_interval_seconds = 0

[redis]
enabled = false
host = "cache.internal"
password = "hunter2"
db = 3

[server]
port = 9100
"#;

        let config: DuetConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.sqlite_path, "/tmp/duet_test.db");
        assert_eq!(config.memory.trading_signal_ttl_seconds, 60);
        assert_eq!(config.memory.agent_decision_ttl_seconds, 1800);
        assert!(config.memory.cleanup_interval().is_none());
        assert!(!config.redis.enabled);
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.redis.url(), "redis://:hunter2@cache.internal:6379/3");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn redis_url_without_password() {
        assert_eq!(RedisConfig::default().url(), "redis://localhost:6379/0");
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let mut config = DuetConfig::default();
        config.memory.system_state_ttl_seconds = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "memory.system_state_ttl_seconds"
            })
        );
    }

    #[test]
    fn validate_rejects_bad_namespace() {
        let mut config = DuetConfig::default();
        config.memory.namespace = "a:b".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NamespaceSeparator(_))
        ));

        config.memory.namespace = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Empty { .. })));
    }

    #[test]
    fn validate_rejects_zero_retention_and_ports() {
        let mut config = DuetConfig::default();
        config.memory.days_to_keep = 0;
        assert!(config.validate().is_err());

        let mut config = DuetConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cleanup_interval_is_valid() {
        let mut config = DuetConfig::default();
        config.memory.cleanup_interval_seconds = 0;
        assert!(config.validate().is_ok());
    }
}
