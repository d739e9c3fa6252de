use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const TOKEN_ENV: &str = "TREEHOLE_TOKEN";
pub const LLM_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const LLM_API_BASE_ENV: &str = "DEEPSEEK_API_BASE";
pub const LLM_MODEL_ENV: &str = "DEEPSEEK_MODEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub forum: ForumConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub comment_page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "https://treehole.pku.edu.cn".to_string(),
            token: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36"
                .to_string(),
            comment_page_size: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_response_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_response_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Posts requested per search call.
    pub max_search_results: u32,
    /// Posts considered for the manual-mode context.
    pub max_context_posts: usize,
    /// Comments rendered per post; `-1` renders all, `0` none.
    pub max_comments_per_post: i32,
    pub max_search_iterations: u32,
    pub search_delay_ms: u64,
    pub inter_post_delay_ms: u64,
    pub max_reviews_per_entity: usize,
    pub max_review_chars: usize,
    pub manual_context_tokens: usize,
    pub tool_observation_tokens: usize,
    pub max_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_search_results: 40,
            max_context_posts: 30,
            max_comments_per_post: 5,
            max_search_iterations: 3,
            search_delay_ms: 1000,
            inter_post_delay_ms: 50,
            max_reviews_per_entity: 30,
            max_review_chars: 600,
            manual_context_tokens: 10000,
            tool_observation_tokens: 8192,
            max_retries: 3,
        }
    }
}

impl AgentConfig {
    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }

    pub fn inter_post_delay(&self) -> Duration {
        Duration::from_millis(self.inter_post_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub backend: CacheBackend,
    pub sqlite_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 86400,
            backend: CacheBackend::Memory,
            sqlite_url: "sqlite://data/cache.db".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV) {
            debug!("Using forum token from {}", TOKEN_ENV);
            self.forum.token = Some(token);
        }
        if let Some(key) = lookup(LLM_API_KEY_ENV) {
            debug!("Using LLM API key from {}", LLM_API_KEY_ENV);
            self.llm.api_key = Some(key);
        }
        if let Some(base) = lookup(LLM_API_BASE_ENV) {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup(LLM_MODEL_ENV) {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forum.token.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingField {
                field: "forum.token".to_string(),
            });
        }
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingField {
                field: "llm.api_key".to_string(),
            });
        }
        if self.forum.comment_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "forum.comment_page_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.agent.max_search_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_search_iterations".to_string(),
                value: "0".to_string(),
            });
        }
        if self.agent.max_search_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.max_search_results".to_string(),
                value: "0".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                value: self.llm.temperature.to_string(),
            });
        }
        Ok(())
    }
}
