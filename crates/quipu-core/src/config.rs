use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::QuipuError;

/// Top-level Quipu configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub quipu: QuipuConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuipuConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for QuipuConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub whatsapp: Option<WhatsAppConfig>,
}

/// WhatsApp Cloud API channel config.
///
/// Inbound messages arrive on the webhook listener; outbound messages go
/// through the Graph API with the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Graph API bearer token.
    #[serde(default)]
    pub access_token: String,
    /// The business phone number ID messages are sent from.
    #[serde(default)]
    pub phone_number_id: String,
    /// Token echoed back during the webhook verification handshake.
    #[serde(default)]
    pub verify_token: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Intent classifier (LLM) config. Any OpenAI-compatible endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            api_key: String::new(),
            model: default_classifier_model(),
        }
    }
}

/// Storage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Tunables for the dialogue router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Items per list page.
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// TTL for a parked duplicate-order decision.
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_minutes: i64,
    /// TTL for a task-update confirmation (longer — users wander off).
    #[serde(default = "default_task_confirmation_ttl")]
    pub task_confirmation_ttl_minutes: i64,
    /// TTL for a pagination cursor.
    #[serde(default = "default_cursor_ttl")]
    pub cursor_ttl_minutes: i64,
    /// Two orders closer together than this count as duplicates.
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window_secs: i64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            confirmation_ttl_minutes: default_confirmation_ttl(),
            task_confirmation_ttl_minutes: default_task_confirmation_ttl(),
            cursor_ttl_minutes: default_cursor_ttl(),
            duplicate_window_secs: default_duplicate_window(),
        }
    }
}

fn default_name() -> String {
    "quipu".to_string()
}

fn default_data_dir() -> String {
    "~/.quipu".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_classifier_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_db_path() -> String {
    "~/.quipu/quipu.db".to_string()
}

fn default_page_size() -> i64 {
    5
}

fn default_confirmation_ttl() -> i64 {
    10
}

fn default_task_confirmation_ttl() -> i64 {
    60
}

fn default_cursor_ttl() -> i64 {
    10
}

fn default_duplicate_window() -> i64 {
    60
}

/// Expand a leading `~/` to the user's home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load config from a TOML file, falling back to defaults when absent.
pub fn load(path: &str) -> Result<Config, QuipuError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config {
            quipu: QuipuConfig::default(),
            channel: ChannelConfig::default(),
            classifier: ClassifierConfig::default(),
            memory: MemoryConfig::default(),
            dialogue: DialogueConfig::default(),
        });
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| QuipuError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| QuipuError::Config(format!("failed to parse config: {}", e)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.quipu.name, "quipu");
        assert_eq!(config.dialogue.page_size, 5);
        assert_eq!(config.dialogue.duplicate_window_secs, 60);
        assert_eq!(config.dialogue.confirmation_ttl_minutes, 10);
        assert!(config.channel.whatsapp.is_none());
    }

    #[test]
    fn test_partial_section_overrides() {
        let raw = r#"
            [dialogue]
            page_size = 10

            [channel.whatsapp]
            enabled = true
            access_token = "tok"
            phone_number_id = "12345"
            verify_token = "hush"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.dialogue.page_size, 10);
        // Untouched fields keep their defaults.
        assert_eq!(config.dialogue.cursor_ttl_minutes, 10);
        let wa = config.channel.whatsapp.unwrap();
        assert!(wa.enabled);
        assert_eq!(wa.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_shellexpand() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(shellexpand("~/x.db"), "/home/tester/x.db");
        assert_eq!(shellexpand("/abs/x.db"), "/abs/x.db");
        assert_eq!(shellexpand(":memory:"), ":memory:");
    }
}
