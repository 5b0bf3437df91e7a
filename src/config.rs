//! Tool configuration.
//!
//! Defaults work out of the box; a `swift-augment.toml` next to the
//! invocation overrides them, and CLI flags override the file. The core
//! consumes a validated [`ToolConfig`], never raw TOML.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bridge::GeneratorConfig;
use crate::swift::DeclKind;

/// File name probed in the working directory when no path is given.
pub const CONFIG_FILE: &str = "swift-augment.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolConfig {
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub documentation: DocumentationSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSettings {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Total attempt cap, counting the first try.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_backoff_cap_seconds")]
    pub backoff_cap_seconds: u64,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentationSettings {
    /// Declaration kinds the whole-file document pass targets.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptSettings {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Directory of `.swift` files concatenated into every prompt.
    #[serde(default)]
    pub context_dir: Option<PathBuf>,
}

fn default_binary() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> f64 {
    120.0
}

fn default_backoff_cap_seconds() -> u64 {
    30
}

fn default_grace_seconds() -> f64 {
    2.0
}

fn default_kinds() -> Vec<String> {
    DeclKind::ALL.iter().map(|k| k.label().to_string()).collect()
}

fn default_max_length() -> usize {
    32_768
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: default_model(),
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            backoff_cap_seconds: default_backoff_cap_seconds(),
            grace_seconds: default_grace_seconds(),
        }
    }
}

impl Default for DocumentationSettings {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
        }
    }
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            context_dir: None,
        }
    }
}

impl ToolConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.generator.binary.trim().is_empty() {
            issues.push(ValidationIssue::InvalidValue {
                field: "generator.binary",
                message: "must not be empty".to_string(),
            });
        }
        if self.generator.model.trim().is_empty() {
            issues.push(ValidationIssue::InvalidValue {
                field: "generator.model",
                message: "must not be empty".to_string(),
            });
        }
        if self.generator.max_retries == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "generator.max_retries",
                message: "must be at least 1".to_string(),
            });
        }
        if !(self.generator.timeout_seconds.is_finite() && self.generator.timeout_seconds > 0.0) {
            issues.push(ValidationIssue::InvalidValue {
                field: "generator.timeout_seconds",
                message: "must be a positive number".to_string(),
            });
        }
        if !(self.generator.grace_seconds.is_finite() && self.generator.grace_seconds >= 0.0) {
            issues.push(ValidationIssue::InvalidValue {
                field: "generator.grace_seconds",
                message: "must be zero or positive".to_string(),
            });
        }
        if self.prompt.max_length == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "prompt.max_length",
                message: "must be at least 1".to_string(),
            });
        }
        if self.documentation.kinds.is_empty() {
            issues.push(ValidationIssue::InvalidValue {
                field: "documentation.kinds",
                message: "must name at least one declaration kind".to_string(),
            });
        }
        for kind in &self.documentation.kinds {
            if DeclKind::parse(kind).is_none() {
                issues.push(ValidationIssue::UnknownKind { kind: kind.clone() });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            binary: self.generator.binary.clone(),
            model: self.generator.model.clone(),
            max_retries: self.generator.max_retries,
            timeout: Duration::from_secs_f64(self.generator.timeout_seconds),
            backoff_cap: Duration::from_secs(self.generator.backoff_cap_seconds),
            grace: Duration::from_secs_f64(self.generator.grace_seconds),
        }
    }

    /// Parsed kind list; validation guarantees every entry parses.
    pub fn documentation_kinds(&self) -> Vec<DeclKind> {
        self.documentation
            .kinds
            .iter()
            .filter_map(|k| DeclKind::parse(k))
            .collect()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    InvalidValue {
        field: &'static str,
        message: String,
    },
    UnknownKind {
        kind: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "{field}: {message}")
            }
            ValidationIssue::UnknownKind { kind } => {
                write!(
                    f,
                    "unknown declaration kind {kind:?} (expected one of: function, \
                     initializer, type, protocol, extension)"
                )
            }
        }
    }
}

pub fn load_from_str(input: &str) -> Result<ToolConfig, ConfigError> {
    let config: ToolConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ToolConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Explicit path must exist; otherwise probe [`CONFIG_FILE`] and fall back
/// to defaults when it is absent.
pub fn load_or_default(path: Option<&Path>) -> Result<ToolConfig, ConfigError> {
    match path {
        Some(path) => load_from_path(path),
        None => {
            let probe = Path::new(CONFIG_FILE);
            if probe.exists() {
                load_from_path(probe)
            } else {
                Ok(ToolConfig::default())
            }
        }
    }
}
