use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::browser::DriverConfig;
use crate::classifier::ClassifierRules;
use crate::monitor::MonitorError;

/// Keyword defaults applied when no keywords are configured.
pub const DEFAULT_KEYWORDS: &[&str] =
    &["urgente", "importante", "atenção", "prioridade", "crítico"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Case-insensitive substrings marking a message as important.
    pub keywords: Vec<String>,
    /// Contacts whose messages are always important (exact match).
    pub important_contacts: Vec<String>,
    /// Minutes between poll cycles (>= 1).
    pub check_interval_minutes: u64,
    /// Minutes between summary generations (>= 1; sensibly >= the check
    /// interval, since summaries draw only from what has been polled).
    pub summary_interval_minutes: u64,
    /// Upper bound on messages included in one summary (>= 1).
    pub max_messages_per_summary: usize,
    /// How many recent messages to read per opened conversation.
    pub recent_window: usize,
    /// Root for the browser profile, state database and summary files.
    pub data_dir: PathBuf,
    /// WebDriver endpoint (chromedriver).
    pub webdriver_url: String,
    /// URL of the monitored web client.
    pub service_url: String,
    pub headless: bool,
    /// Wait for an already-authenticated session.
    pub connect_timeout_secs: u64,
    /// Wait for the authentication challenge to be completed.
    pub auth_timeout_secs: u64,
    /// Wait for an opened conversation to render its messages.
    pub conversation_load_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".whatsapp-monitor");
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            important_contacts: Vec::new(),
            check_interval_minutes: 15,
            summary_interval_minutes: 60,
            max_messages_per_summary: 10,
            recent_window: 10,
            data_dir,
            webdriver_url: "http://localhost:9515".to_string(),
            service_url: "https://web.whatsapp.com/".to_string(),
            headless: true,
            connect_timeout_secs: 30,
            auth_timeout_secs: 300,
            conversation_load_timeout_secs: 5,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Build configuration from the environment: `MONITOR_CONFIG_PATH`
    /// names an optional TOML file, individual `MONITOR_*` variables
    /// override on top of it.
    pub fn from_env() -> Result<Self, MonitorError> {
        dotenvy::dotenv().ok();

        let mut config = match env::var("MONITOR_CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim()))?,
            _ => Self::default(),
        };

        if let Some(keywords) = env_list("MONITOR_KEYWORDS") {
            config.keywords = keywords;
        }
        if let Some(contacts) = env_list("MONITOR_IMPORTANT_CONTACTS") {
            config.important_contacts = contacts;
        }
        if let Some(minutes) = env_parse::<u64>("MONITOR_CHECK_INTERVAL_MINUTES") {
            config.check_interval_minutes = minutes;
        }
        if let Some(minutes) = env_parse::<u64>("MONITOR_SUMMARY_INTERVAL_MINUTES") {
            config.summary_interval_minutes = minutes;
        }
        if let Some(max) = env_parse::<usize>("MONITOR_MAX_MESSAGES_PER_SUMMARY") {
            config.max_messages_per_summary = max;
        }
        if let Some(dir) = env::var("MONITOR_DATA_DIR").ok().filter(|v| !v.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = env::var("WEBDRIVER_URL").ok().filter(|v| !v.is_empty()) {
            config.webdriver_url = url;
        }
        if let Ok(value) = env::var("MONITOR_HEADLESS") {
            config.headless = value.to_lowercase() == "true" || value == "1";
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.check_interval_minutes < 1 {
            return Err(MonitorError::InvalidConfig(
                "check_interval_minutes must be >= 1".to_string(),
            ));
        }
        if self.summary_interval_minutes < 1 {
            return Err(MonitorError::InvalidConfig(
                "summary_interval_minutes must be >= 1".to_string(),
            ));
        }
        if self.max_messages_per_summary < 1 {
            return Err(MonitorError::InvalidConfig(
                "max_messages_per_summary must be >= 1".to_string(),
            ));
        }
        if self.recent_window < 1 {
            return Err(MonitorError::InvalidConfig(
                "recent_window must be >= 1".to_string(),
            ));
        }
        if self.summary_interval_minutes < self.check_interval_minutes {
            warn!(
                "summary interval ({}m) is shorter than the check interval ({}m); summaries will repeat the same tail",
                self.summary_interval_minutes, self.check_interval_minutes
            );
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_minutes * 60)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn conversation_load_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation_load_timeout_secs)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir.join("profile")
    }

    pub fn summaries_dir(&self) -> PathBuf {
        self.data_dir.join("summaries")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("state").join("monitor.db")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.profile_dir())?;
        std::fs::create_dir_all(self.summaries_dir())?;
        Ok(())
    }

    pub fn rules(&self) -> ClassifierRules {
        ClassifierRules {
            keywords: self.keywords.clone(),
            important_contacts: self.important_contacts.clone(),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            webdriver_url: self.webdriver_url.clone(),
            profile_dir: Some(self.profile_dir()),
            headless: self.headless,
            ..DriverConfig::default()
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = MonitorConfig::default();
        config.validate().expect("defaults valid");
        assert_eq!(config.check_interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.summary_interval(), Duration::from_secs(60 * 60));
    }

    #[test]
    fn rejects_zero_intervals() {
        let config = MonitorConfig {
            check_interval_minutes: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MonitorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_empty_summaries() {
        let config = MonitorConfig {
            max_messages_per_summary: 0,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("monitor.toml");
        std::fs::write(
            &path,
            r#"
keywords = ["urgente"]
important_contacts = ["Mãe"]
check_interval_minutes = 5
"#,
        )
        .expect("write config");

        let config = MonitorConfig::load(&path).expect("load");
        assert_eq!(config.keywords, vec!["urgente".to_string()]);
        assert_eq!(config.important_contacts, vec!["Mãe".to_string()]);
        assert_eq!(config.check_interval_minutes, 5);
        assert_eq!(config.summary_interval_minutes, 60, "default retained");
    }

    #[test]
    fn rules_carry_configured_lists() {
        let config = MonitorConfig {
            keywords: vec!["prazo".to_string()],
            important_contacts: vec!["Chefe".to_string()],
            ..MonitorConfig::default()
        };
        let rules = config.rules();
        assert_eq!(rules.keywords, vec!["prazo".to_string()]);
        assert_eq!(rules.important_contacts, vec!["Chefe".to_string()]);
    }
}
