use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Endpoints and limits for the remote services the ask pipeline calls.
///
/// Every field has a default, so a YAML file only needs the keys it changes:
///
/// ```yaml
/// data_url: https://api.example.edu/data
/// stage_timeout_secs: 20
/// max_references: 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub translate_url: String,
    pub embed_url: String,
    pub search_url: String,
    pub data_url: String,
    pub generate_url: String,
    pub api_key: Option<String>,
    pub pivot_language: String,
    pub stage_timeout_secs: u64,
    pub embedding_dimensions: Option<usize>,
    pub max_references: Option<usize>,
    pub locations_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            translate_url: "http://localhost:8787/translate".to_string(),
            embed_url: "http://localhost:8787/embed".to_string(),
            search_url: "http://localhost:8787/search".to_string(),
            data_url: "http://localhost:8787/data".to_string(),
            generate_url: "http://localhost:8787/generate".to_string(),
            api_key: None,
            pivot_language: "en".to_string(),
            stage_timeout_secs: 30,
            embedding_dimensions: None,
            max_references: None,
            locations_file: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("translate_url", &self.translate_url),
            ("embed_url", &self.embed_url),
            ("search_url", &self.search_url),
            ("data_url", &self.data_url),
            ("generate_url", &self.generate_url),
        ] {
            Url::parse(value)
                .map_err(|error| ConfigError::Invalid(format!("{name} {value:?}: {error}")))?;
        }

        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stage_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.pivot_language.trim().is_empty() {
            return Err(ConfigError::Invalid("pivot_language is empty".to_string()));
        }

        if self.embedding_dimensions == Some(0) {
            return Err(ConfigError::Invalid(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}
