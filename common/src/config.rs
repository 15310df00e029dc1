use serde::{Deserialize, Serialize};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Notifications kept for `notifications` requests.
    #[serde(default = "default_event_ring_capacity")]
    pub event_ring_capacity: usize,
    #[serde(default = "default_audit_queue_capacity")]
    pub audit_queue_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            event_ring_capacity: default_event_ring_capacity(),
            audit_queue_capacity: default_audit_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Local,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_mode")]
    pub mode: BackendMode,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    /// Where the confirmation e-mail sends a new account.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_session_file")]
    pub session_file: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_realtime_poll_secs")]
    pub realtime_poll_secs: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_auto_confirm")]
    pub auto_confirm: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: default_backend_mode(),
            url: String::new(),
            anon_key: String::new(),
            redirect_url: default_redirect_url(),
            session_file: default_session_file(),
            request_timeout_secs: default_request_timeout_secs(),
            realtime_poll_secs: default_realtime_poll_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            auto_confirm: default_auto_confirm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self { socket_path: default_socket_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    #[serde(default = "default_activity_interval")]
    pub activity_interval_secs: u64,
    #[serde(default = "default_activity_seed")]
    pub activity_seed: usize,
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_alert_seed")]
    pub alert_seed: usize,
    #[serde(default = "default_alert_probability")]
    pub alert_probability: f64,
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            activity_interval_secs: default_activity_interval(),
            activity_seed: default_activity_seed(),
            activity_capacity: default_activity_capacity(),
            alert_interval_secs: default_alert_interval(),
            alert_seed: default_alert_seed(),
            alert_probability: default_alert_probability(),
            alert_capacity: default_alert_capacity(),
        }
    }
}

fn default_event_ring_capacity() -> usize { 256 }
fn default_audit_queue_capacity() -> usize { 64 }
fn default_backend_mode() -> BackendMode { BackendMode::Local }
fn default_redirect_url() -> String { "http://localhost:8080/".to_string() }
fn default_session_file() -> String { "./data/session.json".to_string() }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_realtime_poll_secs() -> u64 { 5 }
fn default_session_ttl_secs() -> u64 { 3600 }
fn default_auto_confirm() -> bool { true }
fn default_socket_path() -> String { "/tmp/ztd-agent.sock".to_string() }
fn default_db_path() -> String { "./data/ztd.db".to_string() }
fn default_activity_interval() -> u64 { 5 }
fn default_activity_seed() -> usize { 15 }
fn default_activity_capacity() -> usize { 50 }
fn default_alert_interval() -> u64 { 10 }
fn default_alert_seed() -> usize { 12 }
fn default_alert_probability() -> f64 { 0.3 }
fn default_alert_capacity() -> usize { 100 }

impl Default for Config {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            backend: BackendConfig::default(),
            ipc: IpcConfig::default(),
            storage: StorageConfig::default(),
            feeds: FeedsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let p = self.feeds.alert_probability;
        anyhow::ensure!(
            p.is_finite() && (0.0..=1.0).contains(&p),
            "feeds.alert_probability must be between 0 and 1, got {}",
            p
        );
        Ok(())
    }

    pub fn default_path() -> String {
        std::env::var("ZTD_CONFIG")
            .unwrap_or_else(|_| "./config/default.toml".to_string())
    }

    /// Backend connection credentials may come from the environment instead
    /// of the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("ZTD_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("ZTD_ANON_KEY") {
            self.backend.anon_key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[backend]
mode = "rest"
url = "https://project.example.co"

[feeds]
alert_probability = 0.5
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.backend.mode, BackendMode::Rest);
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.feeds.alert_probability, 0.5);
        assert_eq!(config.feeds.activity_capacity, 50);
        assert_eq!(config.feeds.alert_capacity, 100);
        assert_eq!(config.ipc.socket_path, "/tmp/ztd-agent.sock");
        assert_eq!(config.agent.event_ring_capacity, 256);
    }

    #[test]
    fn alert_probability_must_be_a_probability() {
        for bad in ["nan", "inf", "1.5", "-0.1"] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[feeds]\nalert_probability = {}", bad).unwrap();
            let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
            assert!(err.to_string().contains("alert_probability"), "{}: {}", bad, err);
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load("/definitely/not/here.toml").is_err());
    }
}
