//! Layered configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`pacer.toml` in the working directory, or the path in `PACER_CONFIG_PATH`),
//! then `PACER_*` environment variables using `__` between sections, e.g.
//! `PACER_LLM__MODEL=gpt-4.1`. A `.env` file is read first when present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sandbox::{Limits, SandboxOptions};
use crate::workflow::VerdictPolicy;

pub const CONFIG_PATH_ENV: &str = "PACER_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "pacer.toml";
const ENV_PREFIX: &str = "PACER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSettings,
    pub sandbox: SandboxSettings,
    pub workflow: WorkflowSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`
    pub base_url: String,
    /// Falls back to `OPENAI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Upper bound for a single provider call
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4.1".to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub timeout_ms: u64,
    pub max_concurrent: usize,
    pub max_steps: u64,
    pub max_output_bytes: usize,
    pub max_collection_len: usize,
    pub max_call_depth: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let limits = Limits::default();
        let options = SandboxOptions::default();
        Self {
            timeout_ms: options.timeout.as_millis() as u64,
            max_concurrent: options.max_concurrent,
            max_steps: limits.max_steps,
            max_output_bytes: limits.max_output_bytes,
            max_collection_len: limits.max_collection_len,
            max_call_depth: limits.max_call_depth,
        }
    }
}

impl SandboxSettings {
    pub fn options(&self) -> SandboxOptions {
        SandboxOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            max_concurrent: self.max_concurrent.max(1),
            limits: Limits {
                max_steps: self.max_steps,
                max_output_bytes: self.max_output_bytes,
                max_collection_len: self.max_collection_len,
                max_call_depth: self.max_call_depth,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Judge/correct rounds per generated program
    pub max_verification_rounds: u32,
    /// Budget for all verification rounds of one program
    pub verification_timeout_secs: u64,
    pub verdict_policy: VerdictPolicy,
    /// `{id}` is replaced with the activity id
    pub activity_link_pattern: String,
    /// Rows of the dataset shown to code generators
    pub sample_rows: usize,
}

impl WorkflowSettings {
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn activity_link(&self, id: i64) -> String {
        self.activity_link_pattern.replace("{id}", &id.to_string())
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_verification_rounds: 1,
            verification_timeout_secs: 120,
            verdict_policy: VerdictPolicy::Exact,
            activity_link_pattern: "https://www.strava.com/activities/{id}".to_string(),
            sample_rows: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "pacer=info,pacer_core=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from the default sources
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render the effective configuration as TOML, API key redacted
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.llm.api_key.is_some() {
            shown.llm.api_key = Some("***".to_string());
        }
        toml::to_string_pretty(&shown).context("Failed to render configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.workflow.max_verification_rounds == 0 {
            anyhow::bail!("workflow.max_verification_rounds must be at least 1");
        }
        if self.workflow.verification_timeout_secs == 0 {
            anyhow::bail!("workflow.verification_timeout_secs must be positive");
        }
        if self.sandbox.timeout_ms == 0 {
            anyhow::bail!("sandbox.timeout_ms must be positive");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be positive");
        }
        if !self.workflow.activity_link_pattern.contains("{id}") {
            anyhow::bail!("workflow.activity_link_pattern must contain {{id}}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    read_env: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            config_path: None,
            api_key: None,
            model: None,
            read_env: true,
        }
    }
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Ignore `.env` and process environment variables
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub fn build(self) -> Result<Config> {
        if self.read_env {
            dotenvy::dotenv().ok();
        }

        let explicit = self.config_path.clone().or_else(|| {
            self.read_env
                .then(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
                .flatten()
        });

        let mut builder = config::Config::builder();
        match &explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder = builder.add_source(file_source(path).required(true));
            }
            None => {
                builder = builder.add_source(file_source(Path::new(DEFAULT_CONFIG_FILE)).required(false));
            }
        }
        if self.read_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut loaded: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(key) = self.api_key {
            loaded.llm.api_key = Some(key);
        }
        if let Some(model) = self.model {
            loaded.llm.model = model;
        }
        if loaded.llm.api_key.is_none() && self.read_env {
            loaded.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        loaded.validate()?;
        Ok(loaded)
    }
}

fn file_source(path: &Path) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path).format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::builder().without_env().build().unwrap();
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.workflow.max_verification_rounds, 1);
        assert_eq!(config.workflow.verdict_policy, VerdictPolicy::Exact);
        assert_eq!(config.sandbox.options(), SandboxOptions::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[llm]
model = "gpt-4o-mini"
timeout_secs = 5

[workflow]
max_verification_rounds = 3
verdict_policy = "lenient"

[sandbox]
max_steps = 1000
"#,
        );
        let config = Config::builder()
            .without_env()
            .config_path(Some(file.path().to_path_buf()))
            .build()
            .unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.timeout(), Duration::from_secs(5));
        assert_eq!(config.workflow.max_verification_rounds, 3);
        assert_eq!(config.workflow.verdict_policy, VerdictPolicy::Lenient);
        assert_eq!(config.sandbox.options().limits.max_steps, 1000);
        // untouched sections keep their defaults
        assert_eq!(config.workflow.sample_rows, 5);
    }

    #[test]
    fn test_builder_overrides_win() {
        let file = write_config("[llm]\nmodel = \"from-file\"\n");
        let config = Config::builder()
            .without_env()
            .config_path(Some(file.path().to_path_buf()))
            .model(Some("from-cli".to_string()))
            .api_key(Some("sk-cli".to_string()))
            .build()
            .unwrap();
        assert_eq!(config.llm.model, "from-cli");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-cli"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = Config::builder()
            .without_env()
            .config_path(Some(PathBuf::from("/nonexistent/pacer.toml")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_rounds_rejected() {
        let file = write_config("[workflow]\nmax_verification_rounds = 0\n");
        let result = Config::builder()
            .without_env()
            .config_path(Some(file.path().to_path_buf()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_activity_link() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.activity_link(15225395752), "https://www.strava.com/activities/15225395752");
    }

    #[test]
    fn test_toml_rendering_redacts_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[workflow]"));
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("sk-secret"));
    }
}
