use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    /// Model used by the code assistant. Falls back to `model` when absent.
    #[serde(default)]
    pub coder_model: Option<ModelConfig>,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Context window passed to the backend.
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    /// Ask the backend for a reasoning trace.
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ModelConfig {
    pub fn ollama(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            num_ctx: default_num_ctx(),
            timeout_secs: default_model_timeout(),
            reasoning: false,
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String { "ollama".to_string() }
fn default_num_ctx() -> u32 { 8192 }
fn default_model_timeout() -> u64 { 120 }
fn default_temperature() -> f32 { 0.0 }

/// Endpoints of the retrieval and warehouse collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_rag_url")]
    pub rag_url: String,
    #[serde(default = "default_warehouse_url")]
    pub warehouse_url: String,
    #[serde(default = "default_documents_collection")]
    pub documents_collection: String,
    #[serde(default = "default_schemas_collection")]
    pub schemas_collection: String,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            rag_url: default_rag_url(),
            warehouse_url: default_warehouse_url(),
            documents_collection: default_documents_collection(),
            schemas_collection: default_schemas_collection(),
            timeout_secs: default_service_timeout(),
        }
    }
}

fn default_rag_url() -> String { "http://localhost:8001".to_string() }
fn default_warehouse_url() -> String { "http://localhost:8002".to_string() }
fn default_documents_collection() -> String { "internal_documents".to_string() }
fn default_schemas_collection() -> String { "db_table_schemas".to_string() }
fn default_service_timeout() -> u64 { 30 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum steps one run may execute before failing.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize { 25 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_backend")]
    pub backend: CheckpointBackend,
    #[serde(default = "default_checkpoint_path")]
    pub path: String,
}

impl CheckpointConfig {
    /// Resolve the database path (expand ~).
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            path: default_checkpoint_path(),
        }
    }
}

fn default_checkpoint_backend() -> CheckpointBackend { CheckpointBackend::Sqlite }
fn default_checkpoint_path() -> String { "~/.trellis/checkpoints.db".to_string() }

/// Human approval before the data explorer runs a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_edit: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_edit: true,
        }
    }
}

fn default_true() -> bool { true }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TrellisError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| TrellisError::Config(e.to_string()))
    }

    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let reasoning = lookup("DEFAULT_REASONING_ENABLE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let llm_url = lookup("LLM_SERVICE_URL");

        let mut model = ModelConfig::ollama(
            lookup("DEFAULT_MODEL_NAME").unwrap_or_else(|| "qwen3:8b".to_string()),
        );
        model.base_url = llm_url.clone();
        model.reasoning = reasoning;

        let mut coder = ModelConfig::ollama(
            lookup("DEFAULT_CODER_MODEL_NAME").unwrap_or_else(|| "qwen2.5-coder:7b".to_string()),
        );
        coder.base_url = llm_url;

        let defaults = ServicesConfig::default();
        let services = ServicesConfig {
            rag_url: lookup("RAG_SERVICE_URL").unwrap_or(defaults.rag_url),
            warehouse_url: lookup("DW_SERVICE_URL").unwrap_or(defaults.warehouse_url),
            documents_collection: lookup("INTERNAL_DOCUMENT_RAG_COLLECTION_NAME")
                .unwrap_or(defaults.documents_collection),
            schemas_collection: lookup("DB_TABLE_SCHEMAS_RAG_COLLECTION_NAME")
                .unwrap_or(defaults.schemas_collection),
            timeout_secs: defaults.timeout_secs,
        };

        Self {
            model,
            coder_model: Some(coder),
            services,
            graph: GraphConfig::default(),
            checkpoint: CheckpointConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }

    /// Default config file location: `~/.trellis/config.toml`.
    pub fn default_path() -> PathBuf {
        expand_home("~/.trellis/config.toml")
    }

    /// Model for the code assistant.
    pub fn coder(&self) -> &ModelConfig {
        self.coder_model.as_ref().unwrap_or(&self.model)
    }
}

/// Replace `${VAR}` with the variable's value, keeping unset references as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
