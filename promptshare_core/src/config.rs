use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Viewer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptShareConfig {
    /// Base URL of the PostgREST style store (e.g. https://xyz.supabase.co)
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Public key sent as both `apikey` and bearer token
    #[serde(default)]
    pub store_api_key: String,

    /// OpenAI-compatible endpoint used for prompt generation
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,

    #[serde(default)]
    pub llm_api_key: String,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    /// Viewer used by the command line driver
    #[serde(default)]
    pub viewer: Option<ViewerSettings>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Rows requested per page. Must not exceed the store's own row cap
    /// (PostgREST `max-rows`, 1000 on hosted Supabase): a capped page looks
    /// short and ends the fetch early.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Tried in order, most capable first
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_batch_count")]
    pub batch_count: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound for one batch across every candidate model
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            models: default_models(),
            batch_count: default_batch_count(),
            batch_size: default_batch_size(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    pub id: String,
    pub name: String,
}

impl Default for PromptShareConfig {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            store_api_key: String::new(),
            llm_api_url: default_llm_url(),
            llm_api_key: String::new(),
            sync: SyncSettings::default(),
            generation: GenerationSettings::default(),
            viewer: None,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl PromptShareConfig {
    /// Reads the TOML file at `path` (or the default location) when present and
    /// then applies `PROMPTSHARE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("promptshare").join("config.toml"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn viewer(&self) -> Option<Viewer> {
        self.viewer
            .as_ref()
            .map(|v| Viewer::new(v.id.clone(), v.name.clone()))
    }

    fn apply_env(&mut self) {
        if let Some(url) = non_empty_var("PROMPTSHARE_STORE_URL") {
            self.store_url = url;
        }
        if let Some(key) = non_empty_var("PROMPTSHARE_STORE_KEY") {
            self.store_api_key = key;
        }
        if let Some(url) = non_empty_var("PROMPTSHARE_LLM_URL") {
            self.llm_api_url = url;
        }
        if let Some(key) = non_empty_var("PROMPTSHARE_LLM_KEY") {
            self.llm_api_key = key;
        }
        if let Some(models) = non_empty_var("PROMPTSHARE_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect();
            if !models.is_empty() {
                self.generation.models = models;
            }
        }
        if let Some(id) = non_empty_var("PROMPTSHARE_VIEWER_ID") {
            let name = non_empty_var("PROMPTSHARE_VIEWER_NAME").unwrap_or_else(|| id.clone());
            self.viewer = Some(ViewerSettings { id, name });
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|raw| !raw.trim().is_empty())
}

fn default_store_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_llm_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_models() -> Vec<String> {
    [
        "gemini-2.5-flash",
        "gemini-2.0-flash",
        "gemini-1.5-flash",
        "gemini-1.5-flash-8b",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_batch_count() -> usize {
    3
}

fn default_batch_size() -> usize {
    15
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_http_timeout() -> u64 {
    15
}
