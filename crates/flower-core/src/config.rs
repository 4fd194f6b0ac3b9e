use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::ai::{gemini, ollama};
use crate::provider::Provider;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub ollama_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::Gemini.as_str().to_string()),
            default_model: None,
            gemini_api_key: None,
            ollama_url: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(Provider::from_str)
            .unwrap_or_default()
    }

    /// Environment first, then the config file
    pub fn gemini_api_key(&self) -> Option<String> {
        self.gemini_api_key_with(gemini::env_var)
    }

    pub fn gemini_api_key_with(&self, env_lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        gemini::key_from(env_lookup).or_else(|| self.stored_key())
    }

    /// Where the key came from: "env", "config", or None
    pub fn gemini_key_source(&self) -> Option<&'static str> {
        self.gemini_key_source_with(gemini::env_var)
    }

    pub fn gemini_key_source_with(&self, env_lookup: impl Fn(&str) -> Option<String>) -> Option<&'static str> {
        if gemini::key_from(env_lookup).is_some() {
            Some("env")
        } else if self.stored_key().is_some() {
            Some("config")
        } else {
            None
        }
    }

    fn stored_key(&self) -> Option<String> {
        self.gemini_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
    }

    /// Apply the settings given on the command line; `None` leaves a field alone
    pub fn update(
        &mut self,
        provider: Option<&str>,
        model: Option<&str>,
        ollama_url: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = provider {
            let provider = Provider::from_str(name).ok_or_else(|| {
                let known: Vec<&str> = Provider::all().iter().map(|p| p.as_str()).collect();
                anyhow!("Unknown provider '{}' (expected one of: {})", name, known.join(", "))
            })?;
            if provider != self.provider() {
                // A model name only makes sense for the provider it was chosen for
                self.default_model = None;
            }
            self.provider = Some(provider.as_str().to_string());
        }
        if let Some(model) = model {
            self.default_model = Some(model.to_string()).filter(|m| !m.trim().is_empty());
        }
        if let Some(url) = ollama_url {
            self.ollama_url = Some(url.trim_end_matches('/').to_string()).filter(|u| !u.is_empty());
        }
        Ok(())
    }

    pub fn ollama_url(&self) -> &str {
        self.ollama_url.as_deref().unwrap_or(ollama::DEFAULT_URL)
    }

    /// Model in use for the configured provider
    pub fn model(&self) -> String {
        self.default_model.clone().unwrap_or_else(|| match self.provider() {
            Provider::Gemini => gemini::DEFAULT_MODEL.to_string(),
            Provider::Ollama => ollama::DEFAULT_MODEL.to_string(),
        })
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("flower-hub").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.provider(), Provider::Gemini);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            provider: Some("ollama".to_string()),
            default_model: Some("llama3.2".to_string()),
            gemini_api_key: None,
            ollama_url: Some("http://box:11434".to_string()),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.provider(), Provider::Ollama);
        assert_eq!(loaded.model(), "llama3.2");
        assert_eq!(loaded.ollama_url(), "http://box:11434");
    }

    #[test]
    fn test_key_prefers_environment_then_config() {
        let mut config = Config::new();
        assert_eq!(config.gemini_api_key_with(|_| None), None);
        assert_eq!(config.gemini_key_source_with(|_| None), None);

        config.gemini_api_key = Some("from-file".to_string());
        assert_eq!(config.gemini_api_key_with(|_| None).as_deref(), Some("from-file"));
        assert_eq!(config.gemini_key_source_with(|_| None), Some("config"));

        let env = |var: &str| (var == "API_KEY").then(|| "from-env".to_string());
        assert_eq!(config.gemini_api_key_with(env).as_deref(), Some("from-env"));
        assert_eq!(config.gemini_key_source_with(env), Some("env"));
    }

    #[test]
    fn test_blank_stored_key_is_ignored() {
        let config = Config {
            gemini_api_key: Some("   ".to_string()),
            ..Config::new()
        };
        assert_eq!(config.gemini_api_key_with(|_| None), None);
        assert_eq!(config.gemini_key_source_with(|_| None), None);
    }

    #[test]
    fn test_update_then_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config {
            default_model: Some("gemini-2.5-pro".to_string()),
            ..Config::new()
        };

        config.update(Some("Ollama"), None, Some("http://box:11434/")).unwrap();
        assert_eq!(config.provider(), Provider::Ollama);
        assert_eq!(config.model(), ollama::DEFAULT_MODEL);
        assert_eq!(config.ollama_url(), "http://box:11434");

        config.update(None, Some("llama3.2"), None).unwrap();
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.model(), "llama3.2");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_update_rejects_unknown_provider() {
        let mut config = Config::new();
        let err = config.update(Some("claude"), Some("x"), None).unwrap_err();
        assert!(err.to_string().contains("gemini, ollama"));
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_older_file_without_ollama_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider":"bogus","default_model":null,"gemini_api_key":null}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider(), Provider::Gemini);
        assert_eq!(loaded.ollama_url(), ollama::DEFAULT_URL);
        assert_eq!(loaded.model(), gemini::DEFAULT_MODEL);
    }
}
