use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub openai: OpenAiSettings,
}

/// Settings for the recipe-generation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub url: String,
}

impl OpenAiSettings {
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: get("OPENAI_API_KEY"),
            model: get("RECIPEBOX_OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            url: get("RECIPEBOX_OPENAI_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
        }
    }
}

impl Config {
    /// Resolve the data directory (`RECIPEBOX_DATA_DIR` or the platform data
    /// dir) and read generation settings from the environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match get("RECIPEBOX_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "recipebox")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("recipebox.db");

        Ok(Config {
            db_path,
            data_dir,
            openai: OpenAiSettings::from_lookup(get),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_data_dir_override_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("data");
        let config =
            Config::from_lookup(lookup(&[("RECIPEBOX_DATA_DIR", dir.to_str().unwrap())])).unwrap();
        assert!(config.data_dir.is_dir());
        assert_eq!(config.db_path, dir.join("recipebox.db"));
    }

    #[test]
    fn test_openai_defaults() {
        let settings = OpenAiSettings::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")]));
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(settings.url, DEFAULT_OPENAI_URL);
    }

    #[test]
    fn test_openai_overrides() {
        let settings = OpenAiSettings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RECIPEBOX_OPENAI_MODEL", "gpt-4o"),
            ("RECIPEBOX_OPENAI_URL", "http://localhost:9999/v1/chat/completions"),
        ]));
        assert_eq!(settings.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.url, "http://localhost:9999/v1/chat/completions");
    }
}
