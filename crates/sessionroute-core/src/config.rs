//! Configuration structures for sessionroute.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.

use crate::route::RoutingTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Source log configuration
    pub source: SourceConfig,

    /// Routing table: classification tag -> destination log name.
    /// Must contain both `USA` and `International`.
    pub routing: HashMap<String, String>,

    /// Destination publisher configuration
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Source log consumer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: Vec<String>,

    /// Source log (topic) to consume from
    pub log_name: String,

    /// Client group ID (identification only; partitions are assigned
    /// explicitly, never balanced across a group)
    pub group_id: String,

    /// Maximum records per fetch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bounded read timeout per fetch in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Backoff sleep after an empty batch in milliseconds
    #[serde(default = "default_empty_poll_backoff_ms")]
    pub empty_poll_backoff_ms: u64,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// Where a partition loop starts when no prior position exists
    #[serde(default)]
    pub start_policy: StartPolicy,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Starting position policy for a partition with no prior cursor.
///
/// There is no durable checkpoint: every restart re-applies this policy,
/// so `Latest` skips any backlog and `Earliest` replays the full
/// retention window.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StartPolicy {
    /// Begin after the current tail (skip backlog)
    #[default]
    Latest,
    /// Begin at the oldest retained record (full replay)
    Earliest,
}

/// Transport security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,
}

/// Destination publisher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    /// Bootstrap servers for the destination cluster. Empty means the
    /// source cluster also hosts the destinations.
    #[serde(default)]
    pub bootstrap_servers: Vec<String>,

    /// Producer client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Delivery timeout in milliseconds
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,

    /// Compression codec (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Maximum delivery attempts per record before the record is dropped
    #[serde(default = "default_publish_retries")]
    pub max_retries: u32,

    /// Base retry backoff in milliseconds
    #[serde(default = "default_publish_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: Vec::new(),
            client_id: default_client_id(),
            message_timeout_ms: default_message_timeout_ms(),
            compression: default_compression(),
            max_retries: default_publish_retries(),
            retry_backoff_ms: default_publish_backoff_ms(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Metrics HTTP port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Health check HTTP port
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            health_port: default_health_port(),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_batch_size() -> usize {
    500
}
fn default_fetch_timeout_ms() -> u64 {
    1000
}
fn default_empty_poll_backoff_ms() -> u64 {
    500
}
fn default_session_timeout_ms() -> u32 {
    30000
}
fn default_client_id() -> String {
    "sessionroute".to_string()
}
fn default_message_timeout_ms() -> u64 {
    30000
}
fn default_compression() -> String {
    "snappy".to_string()
}
fn default_publish_retries() -> u32 {
    3
}
fn default_publish_backoff_ms() -> u64 {
    100
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_health_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including the routing table shape.
    /// Faults here are fatal before any partition loop starts.
    pub fn validate(&self) -> crate::Result<()> {
        if self.source.bootstrap_servers.is_empty() {
            return Err(crate::Error::Config(
                "At least one bootstrap server required".into(),
            ));
        }

        if self.source.log_name.is_empty() {
            return Err(crate::Error::Config("Source log name is required".into()));
        }

        if self.source.group_id.is_empty() {
            return Err(crate::Error::Config("Group ID is required".into()));
        }

        if self.source.batch_size == 0 {
            return Err(crate::Error::Config("Batch size must be positive".into()));
        }

        RoutingTable::from_map(&self.routing)?;

        Ok(())
    }

    /// Bootstrap servers for the destination cluster, defaulting to the
    /// source cluster.
    pub fn publisher_servers(&self) -> Vec<String> {
        if self.publisher.bootstrap_servers.is_empty() {
            self.source.bootstrap_servers.clone()
        } else {
            self.publisher.bootstrap_servers.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routing() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("USA".to_string(), "sessions-usa".to_string());
        map.insert("International".to_string(), "sessions-intl".to_string());
        map
    }

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                bootstrap_servers: vec!["localhost:9092".into()],
                log_name: "shopping-sessions".into(),
                group_id: "sessionroute".into(),
                batch_size: default_batch_size(),
                fetch_timeout_ms: default_fetch_timeout_ms(),
                empty_poll_backoff_ms: default_empty_poll_backoff_ms(),
                session_timeout_ms: default_session_timeout_ms(),
                start_policy: StartPolicy::Latest,
                security: SecurityConfig::default(),
            },
            routing: routing(),
            publisher: PublisherConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_servers() {
        let mut config = valid_config();
        config.source.bootstrap_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_log_name() {
        let mut config = valid_config();
        config.source.log_name.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log name"));
    }

    #[test]
    fn test_config_validation_missing_route_is_fatal() {
        let mut config = valid_config();
        config.routing.remove("International");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("International"));
    }

    #[test]
    fn test_publisher_servers_default_to_source() {
        let config = valid_config();
        assert_eq!(config.publisher_servers(), vec!["localhost:9092".to_string()]);

        let mut config = valid_config();
        config.publisher.bootstrap_servers = vec!["dest:9092".into()];
        assert_eq!(config.publisher_servers(), vec!["dest:9092".to_string()]);
    }

    #[test]
    fn test_start_policy_default_is_latest() {
        assert_eq!(StartPolicy::default(), StartPolicy::Latest);
        assert_ne!(StartPolicy::Earliest, StartPolicy::Latest);
    }

    #[test]
    fn test_default_publisher_config() {
        let config = PublisherConfig::default();
        assert!(config.bootstrap_servers.is_empty());
        assert_eq!(config.client_id, "sessionroute");
        assert_eq!(config.message_timeout_ms, 30000);
        assert_eq!(config.compression, "snappy");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff_ms, 100);
    }

    #[test]
    fn test_default_monitoring_config() {
        let config = MonitoringConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [source]
            bootstrap_servers = ["localhost:9092"]
            log_name = "shopping-sessions"
            group_id = "sessionroute"

            [routing]
            USA = "sessions-usa"
            International = "sessions-intl"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.batch_size, 500);
        assert_eq!(config.source.start_policy, StartPolicy::Latest);
        assert_eq!(config.routing["USA"], "sessions-usa");
    }

    #[test]
    fn test_parse_start_policy_earliest() {
        let toml_str = r#"
            [source]
            bootstrap_servers = ["localhost:9092"]
            log_name = "shopping-sessions"
            group_id = "sessionroute"
            start_policy = "earliest"

            [routing]
            USA = "a"
            International = "b"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.source.start_policy, StartPolicy::Earliest);
    }
}
