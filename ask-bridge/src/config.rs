use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8090

[peer]
# Process hosting the UI; surfaces are forwarded here when no UI is attached locally
url = "http://127.0.0.1:8091"
forward_timeout_secs = 5

[questions]
default_timeout_secs = 300
# Pending questions older than this are swept as abandoned
stale_after_secs = 3600
# Cached answers nobody polled for are dropped after this
answer_ttl_secs = 600
sweep_interval_secs = 30
poll_interval_ms = 500
surface_buffer = 32
"#;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub questions: QuestionsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PeerConfig {
    pub url: Option<String>,
    #[serde(default = "default_forward_timeout_secs")]
    pub forward_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct QuestionsConfig {
    pub default_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub answer_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub surface_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            url: Some("http://127.0.0.1:8091".to_string()),
            forward_timeout_secs: default_forward_timeout_secs(),
        }
    }
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            stale_after_secs: 3600,
            answer_ttl_secs: 600,
            sweep_interval_secs: 30,
            poll_interval_ms: 500,
            surface_buffer: 32,
        }
    }
}

fn default_forward_timeout_secs() -> u64 {
    5
}

impl PeerConfig {
    /// Configured peer URL, treating an empty string as "no peer"
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

impl QuestionsConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn answer_ttl(&self) -> Duration {
        Duration::from_secs(self.answer_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

impl BridgeConfig {
    /// Load from the default location, writing a default file on first run
    pub fn load() -> Result<(Self, PathBuf), ConfigError> {
        let config_path = get_config_path();

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Message(format!("Failed to create config directory: {e}"))
            })?;
        }

        if !config_path.exists() {
            std::fs::write(&config_path, DEFAULT_CONFIG).map_err(|e| {
                ConfigError::Message(format!("Failed to write default config: {e}"))
            })?;
        }

        let config = Self::load_from_file(&config_path)?;
        Ok((config, config_path))
    }

    pub fn load_from_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::Message(format!(
                "Configuration file not found: {}",
                config_path.display()
            )));
        }

        let builder = Config::builder()
            .add_source(File::from(config_path.to_path_buf()))
            .add_source(Environment::with_prefix("ASK_BRIDGE").separator("__"))
            .build()?;

        builder.try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("ask-bridge/bridge.toml")
    } else {
        PathBuf::from("bridge.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_file_parses_to_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(DEFAULT_CONFIG.as_bytes()).unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8090");
        assert_eq!(config.peer.url(), Some("http://127.0.0.1:8091"));
        assert_eq!(config.questions.stale_after(), Duration::from_secs(3600));
        assert_eq!(config.questions.surface_buffer, 32);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhost = \"0.0.0.0\"\nport = 9000\n\n[questions]\npoll_interval_ms = 250").unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.questions.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.questions.default_timeout(), Duration::from_secs(300));
        assert!(config.peer.url().is_some());
    }

    #[test]
    fn test_empty_peer_url_disables_forwarding() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[peer]\nurl = \"\"").unwrap();

        let config = BridgeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.peer.url(), None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = BridgeConfig::load_from_file(Path::new("/nonexistent/bridge.toml"));
        assert!(result.is_err());
    }
}
