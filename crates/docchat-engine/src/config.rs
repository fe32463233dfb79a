use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat};
use docchat_cache::CacheConfig;
use docchat_context::{ContextBudget, DEFAULT_MAX_TURNS};
use docchat_llm::{OpenAiGenerator, DEFAULT_MODEL, OPENAI_API_BASE};
use serde::Deserialize;

use crate::error::{EngineError, Result};

pub const DEFAULT_GENERATOR_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_COST_PER_1K_TOKENS: f64 = 0.002;
pub const DEFAULT_MAX_SOURCES: usize = 5;
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_SLOW_RESPONSE_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub context: ContextConfig,
    pub cache: CacheConfig,
    pub answer: AnswerConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Turns handed to the generator when the caller does not ask for a size
    pub default_max_turns: usize,
    pub max_chars: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_max_turns: DEFAULT_MAX_TURNS,
            max_chars: None,
        }
    }
}

impl ContextConfig {
    pub fn with_default_max_turns(mut self, turns: usize) -> Self {
        self.default_max_turns = turns;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    pub fn budget(&self, max_turns: Option<usize>) -> ContextBudget {
        ContextBudget {
            max_turns: max_turns.unwrap_or(self.default_max_turns),
            max_chars: self.max_chars,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Upper bound on retrieval plus generation for one question
    pub generator_timeout_ms: u64,
    /// Price per 1000 tokens used for cost estimates
    pub cost_per_1k_tokens: f64,
    pub max_sources: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            generator_timeout_ms: DEFAULT_GENERATOR_TIMEOUT_MS,
            cost_per_1k_tokens: DEFAULT_COST_PER_1K_TOKENS,
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }
}

impl AnswerConfig {
    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_cost_per_1k_tokens(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }

    pub fn with_max_sources(mut self, max_sources: usize) -> Self {
        self.max_sources = max_sources;
        self
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Answers below this confidence count as low-confidence
    pub low_confidence_threshold: f64,
    /// Answers slower than this count as slow
    pub slow_response_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            slow_response_ms: DEFAULT_SLOW_RESPONSE_MS,
        }
    }
}

impl StatsConfig {
    pub fn with_low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.low_confidence_threshold = threshold;
        self
    }

    pub fn with_slow_response_ms(mut self, slow_response_ms: u64) -> Self {
        self.slow_response_ms = slow_response_ms;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    pub base_url: String,
    // Secret, from ENV only
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            api_key: None,
        }
    }
}

impl GeneratorConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// OpenAI-compatible generator for this configuration
    pub fn openai(&self) -> Result<OpenAiGenerator> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            EngineError::Configuration("OPENAI_API_KEY environment variable is required".to_string())
        })?;
        let generator = OpenAiGenerator::new(api_key)
            .map_err(|e| EngineError::Configuration(format!("{:#}", e)))?
            .with_base_url(self.base_url.as_str())
            .with_model(self.model.as_str());
        Ok(generator)
    }
}

impl Settings {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. DOCCHAT_* environment variables, `__` between levels
    ///    (e.g. `DOCCHAT_CACHE__MAX_ENTRIES=500`)
    pub fn load() -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let config = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("DOCCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.generator.api_key = std::env::var("OPENAI_API_KEY").ok();
        Ok(settings)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> std::result::Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_cache::CacheClass;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.context.default_max_turns, 10);
        assert!(settings.cache.enabled);
        assert_eq!(settings.answer.generator_timeout(), Duration::from_secs(30));
        assert_eq!(settings.logging.format, "pretty");
        assert!(settings.generator.api_key.is_none());
    }

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [context]
            default_max_turns = 6
            max_chars = 4000

            [cache]
            max_entries = 200

            [cache.ttl]
            chat_list_secs = 60

            [answer]
            generator_timeout_ms = 5000
            cost_per_1k_tokens = 0.01

            [stats]
            slow_response_ms = 2000

            [logging]
            level = "debug"
            format = "json"

            [generator]
            model = "gpt-4o"
        "#;

        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.context.default_max_turns, 6);
        assert_eq!(settings.context.max_chars, Some(4000));
        assert_eq!(settings.cache.max_entries, 200);
        assert_eq!(
            settings.cache.policy().ttl(CacheClass::ChatList),
            Duration::from_secs(60)
        );
        assert_eq!(
            settings.cache.policy().ttl(CacheClass::MessageHistory),
            Duration::from_secs(1800)
        );
        assert_eq!(settings.answer.max_sources, DEFAULT_MAX_SOURCES);
        assert_eq!(settings.stats.slow_response_ms, 2000);
        assert_eq!(settings.stats.low_confidence_threshold, 0.5);
        assert_eq!(settings.logging.format, "json");
        assert_eq!(settings.generator.model, "gpt-4o");
        assert_eq!(settings.generator.base_url, OPENAI_API_BASE);
    }

    #[test]
    fn test_loads_through_config_crate() {
        let settings = Settings::from_toml_str(
            r#"
            [answer]
            max_sources = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.answer.max_sources, 3);
        assert_eq!(settings.answer.generator_timeout_ms, DEFAULT_GENERATOR_TIMEOUT_MS);
    }

    #[test]
    fn test_shipped_defaults_match_code_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
        let settings = Settings::from_file(path).unwrap();
        let defaults = Settings::default();

        assert_eq!(settings.context.default_max_turns, defaults.context.default_max_turns);
        assert_eq!(settings.cache, defaults.cache);
        assert_eq!(settings.answer.generator_timeout_ms, defaults.answer.generator_timeout_ms);
        assert_eq!(settings.answer.max_sources, defaults.answer.max_sources);
        assert_eq!(settings.stats.slow_response_ms, defaults.stats.slow_response_ms);
        assert_eq!(settings.generator.model, defaults.generator.model);
    }

    #[test]
    fn test_api_key_is_never_read_from_files() {
        let settings: Settings = toml::from_str(
            r#"
            [generator]
            api_key = "sk-from-file"
            "#,
        )
        .unwrap();
        assert!(settings.generator.api_key.is_none());
    }

    #[test]
    fn test_generator_requires_api_key() {
        let err = GeneratorConfig::default().openai().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));

        let generator = GeneratorConfig::default().with_api_key("sk-test").openai().unwrap();
        assert_eq!(generator.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_budget_uses_default_turns() {
        let context = ContextConfig::default().with_max_chars(100);
        assert_eq!(context.budget(None).max_turns, 10);
        assert_eq!(context.budget(Some(3)).max_turns, 3);
        assert_eq!(context.budget(None).max_chars, Some(100));
    }
}
