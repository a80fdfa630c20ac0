use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub router: RouterConfig,
    pub messages: MessagesConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub classifier: StageStrategy,
    pub input_gate: StageStrategy,
    pub output_gate: StageStrategy,
    pub compose_replies: bool,
    pub request_timeout_secs: u64,
    pub max_handoffs: usize,
    pub history_limit: usize,
    pub domain_terms: Vec<String>,
    pub blocked_output_terms: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagesConfig {
    pub input_rejected: String,
    pub output_rejected: String,
    pub failure: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Gemini)
    }

    fn vendor_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

/// How a pipeline stage computes its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStrategy {
    Keyword,
    Provider,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub classifier: Option<StageStrategy>,
    pub input_gate: Option<StageStrategy>,
    pub output_gate: Option<StageStrategy>,
    pub compose_replies: Option<bool>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_DOMAIN_TERMS: &[&str] = &[
    "refund", "billing", "bill", "charge", "invoice", "payment", "pay", "balance", "account",
    "deposit", "withdraw", "transfer", "loan", "mortgage", "money", "subscription", "product",
    "price", "item", "stock", "order", "buy", "purchase", "pencil", "eraser", "notebook",
    "stationery", "service", "error", "technical", "restart", "crash", "bug", "login",
    "password reset", "outage", "down", "support", "book", "library", "author",
];

pub const DEFAULT_BLOCKED_OUTPUT_TERMS: &[&str] = &[
    "api key", "api_key", "secret", "pin code", "stack trace", "panicked at", "traceback",
    "internal error:",
];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                base_url: None,
                model: "gemini-2.0-flash".to_string(),
                timeout_secs: 5,
                max_retries: 2,
                retry_backoff_ms: 250,
            },
            router: RouterConfig {
                classifier: StageStrategy::Keyword,
                input_gate: StageStrategy::Keyword,
                output_gate: StageStrategy::Keyword,
                compose_replies: false,
                request_timeout_secs: 30,
                max_handoffs: 3,
                history_limit: 20,
                domain_terms: DEFAULT_DOMAIN_TERMS.iter().map(|term| term.to_string()).collect(),
                blocked_output_terms: DEFAULT_BLOCKED_OUTPUT_TERMS
                    .iter()
                    .map(|term| term.to_string())
                    .collect(),
            },
            messages: MessagesConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            input_rejected: "Sorry, I can only help with billing, product, and technical support questions."
                .to_string(),
            output_rejected: "Sorry, I couldn't put together an answer that meets our support policy. Please rephrase your question or contact a human agent."
                .to_string(),
            failure: "Sorry, something went wrong while handling your request. Please try again shortly."
                .to_string(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|gemini|ollama)"
            ))),
        }
    }
}

impl FromStr for StageStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "provider" => Ok(Self::Provider),
            other => Err(ConfigError::Validation(format!(
                "unsupported stage strategy `{other}` (expected keyword|provider)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| self.provider.default_base_url().to_string())
    }
}

impl RouterConfig {
    /// True when any stage calls out to the generative-model provider.
    pub fn uses_provider(&self) -> bool {
        self.classifier == StageStrategy::Provider
            || self.input_gate == StageStrategy::Provider
            || self.output_gate == StageStrategy::Provider
            || self.compose_replies
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("switchboard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            assign(&mut self.llm.provider, llm.provider);
            assign(&mut self.llm.api_key, llm.api_key.map(|key| Some(secret_value(key))));
            assign(&mut self.llm.base_url, llm.base_url.map(Some));
            assign(&mut self.llm.model, llm.model);
            assign(&mut self.llm.timeout_secs, llm.timeout_secs);
            assign(&mut self.llm.max_retries, llm.max_retries);
            assign(&mut self.llm.retry_backoff_ms, llm.retry_backoff_ms);
        }

        if let Some(router) = patch.router {
            assign(&mut self.router.classifier, router.classifier);
            assign(&mut self.router.input_gate, router.input_gate);
            assign(&mut self.router.output_gate, router.output_gate);
            assign(&mut self.router.compose_replies, router.compose_replies);
            assign(&mut self.router.request_timeout_secs, router.request_timeout_secs);
            assign(&mut self.router.max_handoffs, router.max_handoffs);
            assign(&mut self.router.history_limit, router.history_limit);
            assign(&mut self.router.domain_terms, router.domain_terms);
            assign(&mut self.router.blocked_output_terms, router.blocked_output_terms);
        }

        if let Some(messages) = patch.messages {
            assign(&mut self.messages.input_rejected, messages.input_rejected);
            assign(&mut self.messages.output_rejected, messages.output_rejected);
            assign(&mut self.messages.failure, messages.failure);
        }

        if let Some(server) = patch.server {
            assign(&mut self.server.bind_address, server.bind_address);
            assign(&mut self.server.port, server.port);
            assign(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(logging) = patch.logging {
            assign(&mut self.logging.level, logging.level);
            assign(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHBOARD_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        // The vendor's own variable only counts when no switchboard key is set.
        let vendor_key = self.llm.provider.vendor_key_var().and_then(read_env);
        if let Some(value) = read_env("SWITCHBOARD_LLM_API_KEY").or(vendor_key) {
            self.llm.api_key = Some(secret_value(value));
        }
        assign(&mut self.llm.base_url, read_env("SWITCHBOARD_LLM_BASE_URL").map(Some));
        assign(&mut self.llm.model, read_env("SWITCHBOARD_LLM_MODEL"));
        assign(&mut self.llm.timeout_secs, env_scalar("SWITCHBOARD_LLM_TIMEOUT_SECS")?);
        assign(&mut self.llm.max_retries, env_scalar("SWITCHBOARD_LLM_MAX_RETRIES")?);
        assign(&mut self.llm.retry_backoff_ms, env_scalar("SWITCHBOARD_LLM_RETRY_BACKOFF_MS")?);

        if let Some(value) = read_env("SWITCHBOARD_ROUTER_CLASSIFIER") {
            self.router.classifier = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_INPUT_GATE") {
            self.router.input_gate = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_OUTPUT_GATE") {
            self.router.output_gate = value.parse()?;
        }
        assign(&mut self.router.compose_replies, env_scalar("SWITCHBOARD_ROUTER_COMPOSE_REPLIES")?);
        assign(
            &mut self.router.request_timeout_secs,
            env_scalar("SWITCHBOARD_ROUTER_REQUEST_TIMEOUT_SECS")?,
        );
        assign(&mut self.router.max_handoffs, env_scalar("SWITCHBOARD_ROUTER_MAX_HANDOFFS")?);
        assign(&mut self.router.history_limit, env_scalar("SWITCHBOARD_ROUTER_HISTORY_LIMIT")?);

        assign(&mut self.server.bind_address, read_env("SWITCHBOARD_SERVER_BIND_ADDRESS"));
        assign(&mut self.server.port, env_scalar("SWITCHBOARD_SERVER_PORT")?);
        assign(
            &mut self.server.graceful_shutdown_secs,
            env_scalar("SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        assign(
            &mut self.logging.level,
            read_env("SWITCHBOARD_LOGGING_LEVEL").or_else(|| read_env("SWITCHBOARD_LOG_LEVEL")),
        );
        let log_format =
            read_env("SWITCHBOARD_LOGGING_FORMAT").or_else(|| read_env("SWITCHBOARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.llm.provider, overrides.llm_provider);
        assign(&mut self.llm.model, overrides.llm_model);
        assign(&mut self.llm.api_key, overrides.llm_api_key.map(|key| Some(secret_value(key))));
        assign(&mut self.router.classifier, overrides.classifier);
        assign(&mut self.router.input_gate, overrides.input_gate);
        assign(&mut self.router.output_gate, overrides.output_gate);
        assign(&mut self.router.compose_replies, overrides.compose_replies);
        assign(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm, self.router.uses_provider())?;
        validate_router(&self.router)?;
        validate_messages(&self.messages)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("switchboard.toml"), PathBuf::from("config/switchboard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig, provider_in_use: bool) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if provider_in_use && llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for openai/gemini providers when a router stage uses the `provider` strategy (set SWITCHBOARD_LLM_API_KEY)"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.request_timeout_secs == 0 || router.request_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "router.request_timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if router.max_handoffs == 0 || router.max_handoffs > 10 {
        return Err(ConfigError::Validation(
            "router.max_handoffs must be in range 1..=10".to_string(),
        ));
    }

    if router.history_limit < 2 {
        return Err(ConfigError::Validation(
            "router.history_limit must be at least 2".to_string(),
        ));
    }

    let has_terms = router.domain_terms.iter().any(|term| !term.trim().is_empty());
    if router.input_gate == StageStrategy::Keyword && !has_terms {
        return Err(ConfigError::Validation(
            "router.domain_terms must not be empty when the input gate uses the keyword strategy"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_messages(messages: &MessagesConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("messages.input_rejected", &messages.input_rejected),
        ("messages.output_rejected", &messages.output_rejected),
        ("messages.failure", &messages.failure),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Reads a scalar override such as a port, a timeout or a boolean flag.
fn env_scalar<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.clone(),
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    router: Option<RouterPatch>,
    messages: Option<MessagesPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    classifier: Option<StageStrategy>,
    input_gate: Option<StageStrategy>,
    output_gate: Option<StageStrategy>,
    compose_replies: Option<bool>,
    request_timeout_secs: Option<u64>,
    max_handoffs: Option<usize>,
    history_limit: Option<usize>,
    domain_terms: Option<Vec<String>>,
    blocked_output_terms: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesPatch {
    input_rejected: Option<String>,
    output_rejected: Option<String>,
    failure: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
