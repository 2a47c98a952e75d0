//! Application settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// SQLite database location; `:memory:` keeps everything in process
    pub database_path: String,

    /// JSON file backing the query history
    pub history_path: PathBuf,

    /// Maximum rows shown for a query result
    pub max_display_rows: usize,

    /// Cell values read as missing on top of the built-in markers
    pub extra_null_markers: Vec<String>,

    /// Text-generation service settings
    pub generator: GeneratorSettings,
}

/// Settings for the text-generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// API key; required only by commands that call the service
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Transport timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            history_path: PathBuf::from("query_history.json"),
            max_display_rows: 1000,
            extra_null_markers: Vec::new(),
            generator: GeneratorSettings::default(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl AppSettings {
    /// Defaults overridden by process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(path) = lookup("DATAQUERY_DB") {
            settings.database_path = path;
        }
        if let Some(path) = lookup("DATAQUERY_HISTORY") {
            settings.history_path = PathBuf::from(path);
        }
        if let Some(markers) = lookup("DATAQUERY_NULL_MARKERS") {
            settings.extra_null_markers = markers
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(model) = lookup("DATAQUERY_MODEL") {
            settings.generator.model = model;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            settings.generator.base_url = url.trim_end_matches('/').to_string();
        }
        settings.generator.api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.database_path, ":memory:");
        assert_eq!(settings.history_path, PathBuf::from("query_history.json"));
        assert_eq!(settings.generator.model, "gpt-4o");
        assert!(settings.generator.api_key.is_none());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DATAQUERY_DB", "data.db"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("OPENAI_API_KEY", "sk-test"),
            ("DATAQUERY_NULL_MARKERS", "-, missing ,,"),
        ]
        .into_iter()
        .collect();

        let settings = AppSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(settings.database_path, "data.db");
        assert_eq!(settings.generator.base_url, "http://localhost:8080/v1");
        assert_eq!(settings.generator.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.history_path, PathBuf::from("query_history.json"));
        assert_eq!(settings.extra_null_markers, vec!["-", "missing"]);
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let settings = AppSettings::from_lookup(|key| (key == "OPENAI_API_KEY").then(|| "  ".to_string()));
        assert!(settings.generator.api_key.is_none());
    }
}
