use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LedgerError, Result};

/// Top-level configuration for the ledgerchat service.
///
/// Loaded from `~/.ledgerchat/config.toml` by default. Each section covers
/// one stage of the request pipeline or one cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub data: DataConfig,
}

impl LedgerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port for the chat API.
    pub port: u16,
    /// Address the HTTP listener binds to.
    pub bind_address: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 3040,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Minutes a session token stays valid after issue.
    pub session_ttl_minutes: u64,
    /// Expose `POST /login` for local development.
    pub allow_dev_login: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 60,
            allow_dev_login: false,
        }
    }
}

/// Intent classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Domains scoring below this are ignored.
    pub min_confidence: f32,
    /// Domains within this margin of the best score are kept alongside it.
    pub tie_margin: f32,
    /// Domains at or above this score are always kept.
    pub strong_confidence: f32,
    /// Item count used for "list" queries that name no count.
    pub default_list_limit: usize,
    /// Longest accepted query, in characters.
    pub max_query_length: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.4,
            tie_margin: 0.15,
            strong_confidence: 0.8,
            default_list_limit: 10,
            max_query_length: 2000,
        }
    }
}

/// Handler dispatch and gateway retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single handler, in milliseconds.
    pub handler_timeout_ms: u64,
    /// Extra attempts after a failed gateway call.
    pub gateway_retries: u32,
    /// Pause between gateway attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 3000,
            gateway_retries: 1,
            retry_backoff_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Most records rendered for a single list fact.
    pub max_list_items: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { max_list_items: 10 }
    }
}

/// Generative text backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Provider: "none" or "openai".
    pub provider: String,
    pub model: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Total attempts per composition, including the first.
    pub max_attempts: u32,
    /// Initial backoff, doubled after each failed attempt.
    pub base_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_ms: 15000,
        }
    }
}

/// Data source locations. Unset paths fall back to the built-in data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON account fixture loaded into the in-memory gateway.
    pub fixture_path: Option<String>,
    /// TOML file replacing the built-in fee and FAQ knowledge.
    pub knowledge_path: Option<String>,
}
