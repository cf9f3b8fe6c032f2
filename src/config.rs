//! # Configuration Management
//!
//! Centralized configuration for the luminous stack and the covenant router.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (`LUMINOUS_*`)
//! - Direct instantiation with defaults, or `default_with_overrides()`
//!
//! Durations are written as integer milliseconds and log levels as lowercase
//! strings, so a generated file reads naturally:
//!
//! ```toml
//! [router]
//! address = "0.0.0.0:9999"
//! coherence_threshold = 0.3
//! heartbeat_interval = 10000
//! ```

use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::utils::compression::CompressionKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Current wire protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes identifying a frame ("LUMI")
pub const MAGIC_BYTES: [u8; 4] = [0x4C, 0x55, 0x4D, 0x49];

/// Max allowed frame body size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default router port
pub const DEFAULT_ROUTER_PORT: u16 = 9999;

/// Default minimum coherence below which the router boosts a packet
pub const DEFAULT_COHERENCE_THRESHOLD: f64 = 0.3;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LuminousConfig {
    /// Pipeline configuration for every stack
    #[serde(default)]
    pub stack: StackConfig,

    /// Router configuration
    #[serde(default)]
    pub router: RouterConfig,

    /// Wire and transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LuminousConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `LUMINOUS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(node_id) = std::env::var("LUMINOUS_NODE_ID") {
            config.stack.node_id = Some(node_id);
        }

        if let Ok(addr) = std::env::var("LUMINOUS_ROUTER_ADDRESS") {
            config.router.address = addr;
        }

        if let Ok(threshold) = std::env::var("LUMINOUS_COHERENCE_THRESHOLD") {
            let val = threshold.parse::<f64>().map_err(|e| {
                ProtocolError::ConfigError(format!("LUMINOUS_COHERENCE_THRESHOLD: {e}"))
            })?;
            config.router.coherence_threshold = val;
        }

        if let Ok(heartbeat) = std::env::var("LUMINOUS_HEARTBEAT_INTERVAL_MS") {
            if let Ok(val) = heartbeat.parse::<u64>() {
                config.router.heartbeat_interval = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("LUMINOUS_PEER_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.router.peer_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns a list of problems; an empty list means the configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.stack.validate());
        errors.extend(self.router.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn check_unit_interval(name: &str, value: f64, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        errors.push(format!("{name} must be within [0, 1], got {value}"));
    }
}

/// Per-stack pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StackConfig {
    /// Identifier written into every packet's metadata; a UUID when unset
    #[serde(default)]
    pub node_id: Option<String>,

    /// Initial local coherence level
    pub coherence_level: f64,

    /// Field compatibility below which the field layer rejects a packet
    pub field_compatibility_threshold: f64,

    /// Maximum number of outgoing correlation records kept by the resonance layer
    pub resonance_buffer_capacity: usize,

    /// How long outgoing correlation records are kept
    #[serde(with = "duration_serde")]
    pub resonance_ttl: Duration,

    /// Maximum number of established sessions kept by a stack
    pub max_sessions: usize,

    /// How long an established session stays in the session table
    #[serde(with = "duration_serde")]
    pub session_ttl: Duration,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            coherence_level: 0.5,
            field_compatibility_threshold: 0.3,
            resonance_buffer_capacity: 1024,
            resonance_ttl: Duration::from_secs(300),
            max_sessions: 10_000,
            session_ttl: Duration::from_secs(3600),
        }
    }
}

impl StackConfig {
    /// Validate stack configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(ref id) = self.node_id {
            if id.is_empty() {
                errors.push("node_id cannot be empty when set".to_string());
            }
        }

        check_unit_interval("coherence_level", self.coherence_level, &mut errors);
        check_unit_interval(
            "field_compatibility_threshold",
            self.field_compatibility_threshold,
            &mut errors,
        );

        if self.resonance_buffer_capacity == 0 {
            errors.push("Resonance buffer capacity must be greater than 0".to_string());
        }

        if self.max_sessions == 0 {
            errors.push("Max sessions must be greater than 0".to_string());
        }

        if self.session_ttl.as_secs() < 1 {
            errors.push("Session TTL too short (minimum: 1s)".to_string());
        }

        errors
    }
}

/// Covenant router configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Listen address (e.g., "0.0.0.0:9999")
    pub address: String,

    /// Router identifier; a UUID when unset
    #[serde(default)]
    pub router_id: Option<String>,

    /// Packets below this coherence are boosted before route selection
    pub coherence_threshold: f64,

    /// Initial coherence of the router's own stack
    pub router_coherence: f64,

    /// Interval between field harmonization broadcasts
    #[serde(with = "duration_serde")]
    pub harmonize_interval: Duration,

    /// Interval between heartbeat sweeps
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Peers silent for longer than this are evicted
    #[serde(with = "duration_serde")]
    pub peer_timeout: Duration,

    /// How long a new connection may take to introduce itself
    #[serde(with = "duration_serde")]
    pub hello_timeout: Duration,

    /// Interval between status log lines
    #[serde(with = "duration_serde")]
    pub status_interval: Duration,

    /// Maximum number of concurrently registered peers
    pub max_peers: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_ROUTER_PORT}"),
            router_id: None,
            coherence_threshold: DEFAULT_COHERENCE_THRESHOLD,
            router_coherence: 0.8,
            harmonize_interval: Duration::from_secs(11),
            heartbeat_interval: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(30),
            hello_timeout: Duration::from_millis(500),
            status_interval: Duration::from_secs(30),
            max_peers: 1000,
        }
    }
}

impl RouterConfig {
    /// Validate router configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Router address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid router address format: '{}' (expected format: '0.0.0.0:9999')",
                self.address
            ));
        }

        check_unit_interval("coherence_threshold", self.coherence_threshold, &mut errors);
        check_unit_interval("router_coherence", self.router_coherence, &mut errors);

        if self.heartbeat_interval.as_millis() < 100 {
            errors.push("Heartbeat interval too short (minimum: 100ms)".to_string());
        } else if self.heartbeat_interval.as_secs() > 3600 {
            errors.push("Heartbeat interval too long (maximum: 1 hour)".to_string());
        }

        if self.harmonize_interval.as_millis() < 100 {
            errors.push("Harmonize interval too short (minimum: 100ms)".to_string());
        }

        if self.peer_timeout <= self.heartbeat_interval {
            errors.push("Peer timeout must be longer than the heartbeat interval".to_string());
        }

        if self.hello_timeout.as_millis() < 10 {
            errors.push("Hello timeout too short (minimum: 10ms)".to_string());
        }

        if self.max_peers == 0 {
            errors.push("Max peers must be greater than 0".to_string());
        } else if self.max_peers > 100_000 {
            errors.push(format!(
                "Max peers very high: {} (ensure system resources can support this)",
                self.max_peers
            ));
        }

        errors
    }
}

/// Wire and transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Envelope serialization format
    pub format: SerializationFormat,

    /// Whether frame bodies may be compressed
    pub compression_enabled: bool,

    /// Compression algorithm used when enabled
    pub compression: CompressionKind,

    /// Minimum body size (bytes) before compression is attempted
    #[serde(default)]
    pub compression_threshold_bytes: usize,

    /// Maximum allowed frame body size in bytes
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            format: SerializationFormat::Json,
            compression_enabled: false,
            compression: CompressionKind::Lz4,
            compression_threshold_bytes: 512,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > MAX_FRAME_SIZE {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: {MAX_FRAME_SIZE})",
                self.max_frame_size
            ));
        }

        if self.compression_enabled && self.compression_threshold_bytes > self.max_frame_size {
            errors.push("Compression threshold cannot be larger than max frame size".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("luminous-stack"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            match self.log_file_path {
                Some(ref path) => {
                    if let Some(parent) = Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() && !parent.exists() {
                            errors.push(format!(
                                "Log file directory does not exist: {}",
                                parent.display()
                            ));
                        }
                    }
                }
                None => errors
                    .push("log_file_path must be specified when log_to_file is true".to_string()),
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Duration (de)serialization as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// tracing::Level (de)serialization as lowercase strings
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
