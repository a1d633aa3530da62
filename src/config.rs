//! Configuration types for the delivery service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Messaging channel settings.
    pub channel: ChannelConfig,
    /// Image pool source settings.
    pub source: SourceConfig,
    /// Send schedule settings.
    pub schedule: ScheduleConfig,
    /// Sent-history persistence settings.
    pub history: HistoryConfig,
}

/// Telegram channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Bot API token.
    pub bot_token: String,
    /// Target chat: a numeric id or an `@channel` name.
    pub chat_id: String,
    /// Bot API base URL (overridable for tests).
    pub api_base: String,
    /// Sender ids allowed to issue commands. Empty admits everyone.
    pub allowed_user_ids: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_owned(),
            allowed_user_ids: Vec::new(),
        }
    }
}

/// Which kind of pool the images come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A folder on the local filesystem.
    #[default]
    Local,
    /// A remote Drive-style folder reached over HTTP.
    Remote,
}

/// Image pool source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Pool kind.
    pub kind: SourceKind,
    /// Folder scanned for images when `kind = "local"`.
    pub local_path: Option<PathBuf>,
    /// Remote folder id when `kind = "remote"`.
    pub folder_id: Option<String>,
    /// API key for the remote folder service.
    pub api_key: Option<String>,
    /// Remote folder API base URL (overridable for tests).
    pub api_base: String,
    /// Directory remote fetches are downloaded into.
    pub cache_dir: PathBuf,
    /// File extensions treated as images (lowercase, no leading dot).
    pub extensions: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Local,
            local_path: None,
            folder_id: None,
            api_key: None,
            api_base: "https://www.googleapis.com/drive/v3".to_owned(),
            cache_dir: PathBuf::from("image_cache"),
            extensions: ["jpg", "jpeg", "png", "gif", "bmp", "webp"]
                .map(str::to_owned)
                .to_vec(),
        }
    }
}

/// Send schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minutes between sends.
    pub interval_minutes: u64,
    /// First hour (local time) at which sends are allowed.
    pub start_hour: u8,
    /// Hour (local time) at which sends stop; the window is `[start, end)`.
    pub end_hour: u8,
    /// Delay before the first tick after startup.
    pub warmup_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            start_hour: 9,
            end_hour: 21,
            warmup_secs: 60,
        }
    }
}

impl ScheduleConfig {
    /// Period between sends.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    /// Warm-up delay before the first tick.
    #[must_use]
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }
}

/// Sent-history persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Path of the JSON history record.
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_state_dir().join("sent_history.json"),
        }
    }
}

fn default_state_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".picdrip")
    } else {
        PathBuf::from("/tmp").join(".picdrip")
    }
}

impl BotConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::DripError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::DripError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/picdrip/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("picdrip").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("picdrip")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/picdrip-config/config.toml")
        }
    }

    /// Validate the configuration, returning every problem found.
    ///
    /// An empty list means the service may start. Startup treats a
    /// non-empty list as fatal.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.channel.bot_token.trim().is_empty() {
            problems.push("channel.bot_token is not set".to_owned());
        }
        if self.channel.chat_id.trim().is_empty() {
            problems.push("channel.chat_id is not set".to_owned());
        }

        match self.source.kind {
            SourceKind::Local => match &self.source.local_path {
                None => problems.push("source.local_path is required for a local source".to_owned()),
                Some(path) if !path.exists() => {
                    problems.push(format!("source.local_path does not exist: {}", path.display()));
                }
                Some(_) => {}
            },
            SourceKind::Remote => {
                if self.source.folder_id.as_deref().is_none_or(str::is_empty) {
                    problems.push("source.folder_id is required for a remote source".to_owned());
                }
                if self.source.api_key.as_deref().is_none_or(str::is_empty) {
                    problems.push("source.api_key is required for a remote source".to_owned());
                }
            }
        }

        if self.schedule.interval_minutes == 0 {
            problems.push("schedule.interval_minutes must be greater than zero".to_owned());
        }
        if self.schedule.start_hour > 23 {
            problems.push("schedule.start_hour must be between 0 and 23".to_owned());
        }
        if self.schedule.end_hour > 24 {
            problems.push("schedule.end_hour must be between 1 and 24".to_owned());
        }
        if self.schedule.start_hour >= self.schedule.end_hour {
            problems.push("schedule.start_hour must be before schedule.end_hour".to_owned());
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn valid_config(dir: &std::path::Path) -> BotConfig {
        let mut config = BotConfig::default();
        config.channel.bot_token = "123456:token".to_owned();
        config.channel.chat_id = "@my_channel".to_owned();
        config.source.local_path = Some(dir.to_path_buf());
        config
    }

    #[test]
    fn default_config_has_sensible_schedule() {
        let config = BotConfig::default();
        assert_eq!(config.schedule.interval_minutes, 60);
        assert_eq!(config.schedule.start_hour, 9);
        assert_eq!(config.schedule.end_hour, 21);
        assert_eq!(config.schedule.interval(), Duration::from_secs(3600));
        assert!(!config.source.extensions.is_empty());
    }

    #[test]
    fn default_config_is_not_startable() {
        // Token, chat id, and source path all missing.
        let problems = BotConfig::default().validate();
        assert!(problems.iter().any(|p| p.contains("bot_token")));
        assert!(problems.iter().any(|p| p.contains("chat_id")));
        assert!(problems.iter().any(|p| p.contains("local_path")));
    }

    #[test]
    fn filled_config_validates_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = valid_config(dir.path());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn inverted_window_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.schedule.start_hour = 21;
        config.schedule.end_hour = 9;
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("start_hour must be before")));
    }

    #[test]
    fn remote_source_requires_folder_and_key() {
        let mut config = BotConfig::default();
        config.channel.bot_token = "t".to_owned();
        config.channel.chat_id = "c".to_owned();
        config.source.kind = SourceKind::Remote;
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("folder_id")));
        assert!(problems.iter().any(|p| p.contains("api_key")));
    }

    #[test]
    fn zero_interval_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.schedule.interval_minutes = 0;
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("interval_minutes")));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = BotConfig::default();
        config.channel.bot_token = "123:abc".to_owned();
        config.schedule.interval_minutes = 15;
        config.source.kind = SourceKind::Remote;
        config.source.folder_id = Some("folder".to_owned());

        config.save_to_file(&path).unwrap();
        let loaded = BotConfig::from_file(&path).unwrap();
        assert_eq!(loaded.channel.bot_token, "123:abc");
        assert_eq!(loaded.schedule.interval_minutes, 15);
        assert_eq!(loaded.source.kind, SourceKind::Remote);
        assert_eq!(loaded.source.folder_id.as_deref(), Some("folder"));
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = BotConfig::from_file(std::path::Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(BotConfig::from_file(&path).is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = BotConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("picdrip"));
    }
}
