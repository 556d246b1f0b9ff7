//! Configuration for scribe.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `~/.config/scribe/config.toml`
//! 3. `./scribe.toml`
//! 4. an explicit `--config` file
//! 5. `SCRIBE__SECTION__KEY` environment variables
//!
//! Paths accept `~` and `${VAR}`; the embeddings API key accepts `${VAR}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the per-project config file.
pub const PROJECT_CONFIG_FILE: &str = "scribe.toml";

/// Prefix for environment overrides (`SCRIBE__QDRANT__URL`).
pub const ENV_PREFIX: &str = "SCRIBE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no embeddings API key; set [embeddings].api_key or OPENAI_API_KEY")]
    MissingApiKey,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub docs: DocsConfig,
    pub code: CodeConfig,
    pub qdrant: QdrantConfig,
    pub embeddings: EmbeddingsConfig,
    pub batching: BatchingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the manifest
    pub state_dir: String,

    /// Save the manifest after this many added files
    pub checkpoint_every: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            state_dir: ".scribe".to_string(),
            checkpoint_every: 25,
        }
    }
}

impl IndexConfig {
    pub fn state_path(&self) -> PathBuf {
        expand_path(&self.state_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub root: String,
    pub extensions: Vec<String>,
    pub collection: String,

    /// Sections longer than this are split at paragraph boundaries
    pub max_section_chars: usize,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            root: "docs".to_string(),
            extensions: ["md", "markdown", "mdx", "txt"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            collection: "scribe-docs".to_string(),
            max_section_chars: 1000,
        }
    }
}

impl DocsConfig {
    pub fn root_path(&self) -> PathBuf {
        expand_path(&self.root)
    }
}

/// A labelled code root, e.g. `{ label = "web", path = "~/src/web" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRootConfig {
    pub label: String,
    pub path: String,
}

impl CodeRootConfig {
    pub fn dir(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    pub roots: Vec<CodeRootConfig>,
    pub extensions: Vec<String>,
    pub collection: String,
    pub window_lines: usize,
    pub window_overlap: usize,
    pub max_symbol_lines: usize,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            roots: vec![CodeRootConfig {
                label: "src".to_string(),
                path: "src".to_string(),
            }],
            extensions: ["rs", "ts", "tsx", "js", "jsx", "go", "py"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            collection: "scribe-code".to_string(),
            window_lines: 60,
            window_overlap: 10,
            max_symbol_lines: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    /// gRPC endpoint
    pub url: String,
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// OpenAI-compatible API base, without the `/embeddings` suffix
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,

    /// Literal key or `${VAR}` reference
    pub api_key: Option<String>,
    pub max_retries: u32,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: Some("${OPENAI_API_KEY}".to_string()),
            max_retries: 3,
        }
    }
}

impl EmbeddingsConfig {
    /// Resolve the API key, expanding `${VAR}` references.
    ///
    /// Falls back to `OPENAI_API_KEY` when no key is configured.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            if let Ok(expanded) = shellexpand::env(key) {
                if !expanded.is_empty() {
                    return Ok(expanded.into_owned());
                }
            }
        }
        match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_tokens_per_batch: usize,
    pub chars_per_token: f32,

    /// Texts longer than this are split before embedding
    pub max_chars_per_text: usize,

    /// Most sub-chunks of one oversized text sent per call
    pub oversized_batch_size: usize,
    pub flush_threshold: f32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: 8000,
            chars_per_token: 2.0,
            max_chars_per_text: 6000,
            oversized_batch_size: 50,
            flush_threshold: 0.9,
        }
    }
}

impl BatchingConfig {
    pub fn max_chars_per_batch(&self) -> usize {
        (self.max_tokens_per_batch as f32 * self.chars_per_token) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// ripgrep executable
    pub ripgrep: String,
    pub default_limit: usize,

    /// Treat exact-search queries as literals rather than regexes
    pub fixed_strings: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            ripgrep: "rg".to_string(),
            default_limit: 10,
            fixed_strings: false,
        }
    }
}

impl Config {
    /// Load every layer, with `explicit` as the `--config` file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        if let Some(user) = user_config_path() {
            files.push((user, false));
        }
        files.push((PathBuf::from(PROJECT_CONFIG_FILE), false));
        if let Some(path) = explicit {
            files.push((path.to_path_buf(), true));
        }
        Self::load_layers(&files, None)
    }

    /// Build from defaults, `files` in order (`true` = must exist), then the
    /// environment. `env` replaces the process environment when given.
    fn load_layers(
        files: &[(PathBuf, bool)],
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default().to_toml()?;
        let mut builder = config::Config::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml));

        for (path, required) in files {
            debug!("Config layer {:?} (required: {})", path, required);
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(*required),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let defaults = Self::default().to_toml()?;
        let config: Self = config::Config::builder()
            .add_source(File::from_str(&defaults, FileFormat::Toml))
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.batching;
        let positive = [
            ("batching.max_tokens_per_batch", b.max_tokens_per_batch),
            ("batching.max_chars_per_text", b.max_chars_per_text),
            ("batching.oversized_batch_size", b.oversized_batch_size),
            ("docs.max_section_chars", self.docs.max_section_chars),
            ("code.window_lines", self.code.window_lines),
            ("code.max_symbol_lines", self.code.max_symbol_lines),
            ("embeddings.dimensions", self.embeddings.dimensions),
            ("search.default_limit", self.search.default_limit),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        if b.chars_per_token.is_nan() || b.chars_per_token <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "batching.chars_per_token must be positive, got {}",
                b.chars_per_token
            )));
        }
        if b.flush_threshold.is_nan() || b.flush_threshold <= 0.0 || b.flush_threshold > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "batching.flush_threshold must be in (0, 1], got {}",
                b.flush_threshold
            )));
        }
        if b.max_chars_per_text >= b.max_chars_per_batch() {
            return Err(ConfigError::Invalid(format!(
                "batching.max_chars_per_text ({}) must be below the batch budget ({} chars)",
                b.max_chars_per_text,
                b.max_chars_per_batch()
            )));
        }
        if self.code.window_overlap >= self.code.window_lines {
            return Err(ConfigError::Invalid(format!(
                "code.window_overlap ({}) must be smaller than code.window_lines ({})",
                self.code.window_overlap, self.code.window_lines
            )));
        }

        for (i, root) in self.code.roots.iter().enumerate() {
            if root.label.is_empty() || root.label.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "code root label {:?} must be non-empty and contain no '/'",
                    root.label
                )));
            }
            if self.code.roots[..i].iter().any(|r| r.label == root.label) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate code root label {:?}",
                    root.label
                )));
            }
        }

        if self.docs.collection == self.code.collection {
            return Err(ConfigError::Invalid(
                "docs and code must use different collections".to_string(),
            ));
        }

        Ok(())
    }
}

/// `~/.config/scribe/config.toml` (platform config dir).
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scribe").join("config.toml"))
}

/// Expand `${VAR}` and a leading `~` in a path.
pub fn expand_path(input: &str) -> PathBuf {
    let expanded = shellexpand::full(input)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| shellexpand::tilde(input).into_owned());
    PathBuf::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batching.max_chars_per_batch(), 16_000);
        assert_eq!(config.docs.collection, "scribe-docs");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[docs]
root = "handbook"

[[code.roots]]
label = "web"
path = "../web"

[[code.roots]]
label = "api"
path = "../api"
"#,
        )
        .unwrap();

        assert_eq!(config.docs.root, "handbook");
        assert_eq!(config.docs.max_section_chars, 1000);
        assert_eq!(config.code.roots.len(), 2);
        assert_eq!(config.code.roots[1].label, "api");
        assert_eq!(config.qdrant.url, "http://localhost:6334");
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            "[qdrant]\nurl = \"http://file:6334\"\n\n[batching]\nmax_chars_per_text = 4000\n",
        )
        .unwrap();

        let env = HashMap::from([
            ("SCRIBE__QDRANT__URL".to_string(), "http://env:6334".to_string()),
            ("SCRIBE__SEARCH__DEFAULT_LIMIT".to_string(), "25".to_string()),
        ]);
        let config = Config::load_layers(&[(path, true)], Some(env)).unwrap();

        assert_eq!(config.qdrant.url, "http://env:6334");
        assert_eq!(config.batching.max_chars_per_text, 4000);
        assert_eq!(config.search.default_limit, 25);
    }

    #[test]
    fn test_missing_optional_file_is_ignored() {
        let config = Config::load_layers(
            &[(PathBuf::from("/definitely/not/here.toml"), false)],
            Some(HashMap::new()),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_required_file_is_error() {
        let result = Config::load_layers(
            &[(PathBuf::from("/definitely/not/here.toml"), true)],
            Some(HashMap::new()),
        );
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_rejects_ceiling_above_budget() {
        let mut config = Config::default();
        config.batching.max_chars_per_text = 20_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_overlap_not_below_window() {
        let mut config = Config::default();
        config.code.window_overlap = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let mut config = Config::default();
        config.batching.oversized_batch_size = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("oversized_batch_size"));
    }

    #[test]
    fn test_rejects_duplicate_root_labels() {
        let mut config = Config::default();
        config.code.roots.push(config.code.roots[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_literal_api_key() {
        let embeddings = EmbeddingsConfig {
            api_key: Some("sk-literal".to_string()),
            ..Default::default()
        };
        assert_eq!(embeddings.resolve_api_key().unwrap(), "sk-literal");
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/notes");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("notes"));
        }
        assert_eq!(expand_path("plain/dir"), PathBuf::from("plain/dir"));
    }
}
