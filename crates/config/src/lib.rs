//! Configuration loading, validation, and management for ctxweave.
//!
//! Loads a context configuration from a TOML file (default
//! `configs/context.toml`, or `$CTXWEAVE_CONFIG`) with environment variable
//! overrides for the generation backend. Validates all settings at startup.
//!
//! Every field is optional. Older key spellings are still accepted:
//! `persona.sticky` next to `sticky_docs`, `kb.files`/`kb.dirs` next to
//! `doc_files`/`doc_dirs`, a flat `context` list or `context.add` for facts,
//! and top-level `procedure_enabled`/`procedure_steps`.

use ctxweave_core::state::{BucketKind, SeedState, default_priority};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/context.toml";

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Directive placed first in every generation call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Knowledge included in every turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sticky_docs: Vec<String>,

    /// Files to ingest into the retrieval index
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_files: Vec<String>,

    /// Directories to ingest (recursively) into the retrieval index
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doc_dirs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub procedure_steps: Vec<String>,

    #[serde(default)]
    pub procedure_enabled: bool,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub kb: KbConfig,

    /// Bucket seeds: a flat list (facts) or a table of buckets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<ProcedureConfig>,

    /// Generation backend settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Turn engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Thread persistence settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextConfig")
            .field("system", &self.system)
            .field("sticky_docs", &self.sticky_docs)
            .field("doc_files", &self.doc_files)
            .field("doc_dirs", &self.doc_dirs)
            .field("procedure_steps", &self.procedure_steps)
            .field("procedure_enabled", &self.procedure_enabled)
            .field("persona", &self.persona)
            .field("kb", &self.kb)
            .field("context", &self.context)
            .field("procedure", &self.procedure)
            .field("llm", &self.llm)
            .field("engine", &self.engine)
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default)]
    pub sticky: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub dirs: Vec<String>,
}

/// The `context` key: either a bare list of facts or per-bucket seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextSection {
    Flat(Vec<String>),
    Buckets(BucketSeeds),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketSeeds {
    #[serde(default)]
    pub policies: Vec<String>,

    #[serde(default)]
    pub facts: Vec<String>,

    #[serde(default)]
    pub instructions: Vec<String>,

    #[serde(default)]
    pub examples: Vec<String>,

    /// Bucket names in render order
    #[serde(default)]
    pub priority: Vec<String>,

    /// Older spelling for facts
    #[serde(default)]
    pub add: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcedureConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name reported by the provider (diagnostics only)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// OpenAI-compatible base URL; unset means the provider's own endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// API key (environment variables take over when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "dashscope".into()
}
/// The provider-specific API key variable, if the provider has one.
fn provider_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "dashscope" => Some("DASHSCOPE_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

fn default_model() -> String {
    "qwen-plus".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Documents retrieved per turn
    #[serde(default = "default_top_k")]
    pub retrieve_top_k: usize,

    /// Generation passes allowed per turn; 0 disables the limit
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_top_k() -> usize {
    3
}
fn default_max_rounds() -> u32 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retrieve_top_k: default_top_k(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl EngineConfig {
    /// The round limit as the engine expects it.
    pub fn round_limit(&self) -> Option<u32> {
        (self.max_rounds > 0).then_some(self.max_rounds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// Directory for the file backend
    #[serde(default = "default_checkpoint_dir")]
    pub dir: String,
}

fn default_checkpoint_dir() -> String {
    ".ctxweave/threads".into()
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            dir: default_checkpoint_dir(),
        }
    }
}

impl ContextConfig {
    /// Load configuration from `$CTXWEAVE_CONFIG` or [`DEFAULT_CONFIG_PATH`].
    ///
    /// Environment overrides for the generation backend:
    /// - `CTXWEAVE_API_KEY` (highest priority), then the provider's own key:
    ///   `DASHSCOPE_API_KEY` for dashscope, `OPENAI_API_KEY` for openai
    /// - `CTXWEAVE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CTXWEAVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_with_env(&path)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        tracing::info!(path = %path.display(), "Loaded context configuration");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("CTXWEAVE_API_KEY").or_else(|| {
                provider_key_var(&self.llm.provider).and_then(|var| lookup(var))
            });
        }

        if let Some(model) = lookup("CTXWEAVE_MODEL") {
            self.llm.model = model;
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.engine.retrieve_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "engine.retrieve_top_k must be > 0".into(),
            ));
        }

        for name in self.priority() {
            if BucketKind::from_str(&name).is_err() {
                tracing::warn!(bucket = %name, "Unknown bucket in context.priority, it will be ignored");
            }
        }

        if self.procedure_is_enabled() && self.procedure_step_list().is_empty() {
            tracing::warn!("Procedure enabled without steps, no guidance will be rendered");
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Sticky knowledge: `sticky_docs` followed by `persona.sticky`.
    pub fn sticky(&self) -> Vec<String> {
        self.sticky_docs
            .iter()
            .chain(&self.persona.sticky)
            .cloned()
            .collect()
    }

    /// Files to ingest: `doc_files` followed by `kb.files`.
    pub fn files(&self) -> Vec<String> {
        self.doc_files.iter().chain(&self.kb.files).cloned().collect()
    }

    /// Directories to ingest: `doc_dirs` followed by `kb.dirs`.
    pub fn dirs(&self) -> Vec<String> {
        self.doc_dirs.iter().chain(&self.kb.dirs).cloned().collect()
    }

    pub fn procedure_is_enabled(&self) -> bool {
        self.procedure_enabled || self.procedure.as_ref().is_some_and(|p| p.enabled)
    }

    /// Steps from `procedure.steps`, falling back to `procedure_steps`.
    pub fn procedure_step_list(&self) -> Vec<String> {
        match &self.procedure {
            Some(p) if !p.steps.is_empty() => p.steps.clone(),
            _ => self.procedure_steps.clone(),
        }
    }

    /// Priority list as configured, or the default order.
    pub fn priority(&self) -> Vec<String> {
        match &self.context {
            Some(ContextSection::Buckets(b)) if !b.priority.is_empty() => b.priority.clone(),
            _ => default_priority(),
        }
    }

    /// Initial thread values described by this configuration.
    pub fn seed(&self) -> SeedState {
        let (policies, facts, instructions, examples) = match &self.context {
            None => Default::default(),
            Some(ContextSection::Flat(items)) => {
                (Vec::new(), items.clone(), Vec::new(), Vec::new())
            }
            Some(ContextSection::Buckets(b)) => {
                let facts = if b.facts.is_empty() {
                    b.add.clone()
                } else {
                    b.facts.clone()
                };
                (
                    b.policies.clone(),
                    facts,
                    b.instructions.clone(),
                    b.examples.clone(),
                )
            }
        };

        let procedure_enabled = self.procedure_is_enabled();
        SeedState {
            system: self.system.clone(),
            policies,
            facts,
            instructions,
            examples,
            priority: self.priority(),
            procedure_enabled,
            procedure_steps: if procedure_enabled {
                self.procedure_step_list()
            } else {
                Vec::new()
            },
        }
    }

    /// A starter config file (for `ctxweave check --print-default`).
    pub fn default_toml() -> String {
        let config = Self {
            system: Some("You are a helpful assistant.".into()),
            context: Some(ContextSection::Buckets(BucketSeeds {
                priority: default_priority(),
                ..Default::default()
            })),
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config file found at {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ctxweave_core::Error {
    fn from(e: ConfigError) -> Self {
        ctxweave_core::Error::Config {
            message: e.to_string(),
        }
    }
}
