// Configuration Storage Service
// Handles config file read/write, version backup and environment overrides

use crate::services::authenticity::RetryPolicy;
use crate::services::providers::{ContentFilter, InvocationConfig, ProviderKind, ResponseFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model settings: {0}")]
    Invalid(String),
    #[error("API key not configured for provider {0}")]
    MissingApiKey(&'static str),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub content_filters: Vec<ContentFilter>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Openai,
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            response_format: ResponseFormat::Structured,
            content_filters: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::Invalid("maxOutputTokens must be positive".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model name is empty".to_string()));
        }
        Ok(())
    }

    pub fn invocation_config(&self) -> InvocationConfig {
        InvocationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            response_format: self.response_format,
            content_filters: self.content_filters.clone(),
        }
    }
}

fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f64 { 0.2 }
fn default_max_output_tokens() -> u32 { 1024 }
fn default_timeout_secs() -> u64 { 80 }

impl AppConfig {
    /// Apply `VERAZ_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(provider) = get("VERAZ_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "openai" => self.model.provider = ProviderKind::Openai,
                "anthropic" | "claude" => self.model.provider = ProviderKind::Anthropic,
                other => warn!(provider = other, "config.unknown_provider_override"),
            }
        }
        if let Some(model) = get("VERAZ_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = get("VERAZ_API_URL") {
            self.model.base_url = Some(url);
        }
        if let Some(raw) = get("VERAZ_TEMPERATURE") {
            match raw.parse::<f64>() {
                Ok(t) => self.model.temperature = t,
                Err(_) => warn!(value = %raw, "config.bad_temperature_override"),
            }
        }
    }
}

/// Load configuration once per process: config file (if any) plus environment overrides.
/// Unreadable or invalid files fall back to defaults with a warning.
pub fn app_config() -> &'static AppConfig {
    static CONFIG: OnceLock<AppConfig> = OnceLock::new();
    CONFIG.get_or_init(|| {
        let mut config = match ConfigStore::default_config_dir() {
            Some(dir) => ConfigStore::new(dir).load().unwrap_or_else(|e| {
                warn!(error = %e, "config.load_failed_using_defaults");
                AppConfig::default()
            }),
            None => AppConfig::default(),
        };
        config.apply_env_overrides();
        if let Err(e) = config.model.validate() {
            warn!(error = %e, "config.invalid_model_settings_using_defaults");
            config.model = ModelSettings::default();
        }
        info!(
            provider = config.model.provider.as_str(),
            model = %config.model.model,
            temperature = config.model.temperature,
            "config.loaded"
        );
        config
    })
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("veraz"))
    }

    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(io_err(&self.config_dir))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(io_err(&self.config_file))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.model.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_file, content).map_err(io_err(&self.config_file))
    }

    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(io_err(&backup_dir))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(io_err(&backup_file))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)
    }

    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(io_err(backup_dir))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete provider API key from config file
    pub fn delete_api_key(&self, provider: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.provider, ProviderKind::Openai);
        assert_eq!(config.model.response_format, ResponseFormat::Structured);
        assert!(config.model.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"model": {"provider": "anthropic", "temperature": 0.0}}"#).unwrap();
        assert_eq!(config.model.provider, ProviderKind::Anthropic);
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.model.max_output_tokens, 1024);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut settings = ModelSettings::default();
        settings.temperature = 1.5;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        settings.temperature = 0.7;
        settings.max_output_tokens = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        let vars: HashMap<&str, &str> = [
            ("VERAZ_PROVIDER", "claude"),
            ("VERAZ_MODEL", "claude-3-5-haiku-latest"),
            ("VERAZ_TEMPERATURE", "0.0"),
            ("VERAZ_API_URL", "  "),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.model.provider, ProviderKind::Anthropic);
        assert_eq!(config.model.model, "claude-3-5-haiku-latest");
        assert_eq!(config.model.temperature, 0.0);
        assert!(config.model.base_url.is_none());
    }

    #[test]
    fn test_invocation_config_copies_settings() {
        let mut settings = ModelSettings::default();
        settings.response_format = ResponseFormat::Freeform;
        settings.content_filters.push(ContentFilter {
            category: "HARM_CATEGORY_HARASSMENT".to_string(),
            threshold: "BLOCK_ONLY_HIGH".to_string(),
        });
        let invocation = settings.invocation_config();
        assert_eq!(invocation.response_format, ResponseFormat::Freeform);
        assert_eq!(invocation.content_filters.len(), 1);
        assert_eq!(invocation.max_output_tokens, settings.max_output_tokens);
    }

    #[test]
    fn test_save_load_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());

        assert!(store.get_api_key("openai").unwrap().is_none());
        store.set_api_key("openai", "sk-test").unwrap();
        assert_eq!(store.get_api_key("openai").unwrap().as_deref(), Some("sk-test"));

        // Second save backs up the first file.
        store.delete_api_key("openai").unwrap();
        assert!(store.get_api_key("openai").unwrap().is_none());
        assert!(dir.path().join("backups").read_dir().unwrap().count() >= 1);
    }

    #[test]
    fn test_save_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let mut config = AppConfig::default();
        config.model.temperature = -0.1;
        assert!(store.save(&config).is_err());
        assert!(!dir.path().join("config.json").exists());
    }
}
