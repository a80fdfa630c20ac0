use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use switchboard_core::config::{AppConfig, LlmProvider, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let api_key_env: &'static [&'static str] = match config.llm.provider {
        LlmProvider::OpenAi => &["SWITCHBOARD_LLM_API_KEY", "OPENAI_API_KEY"],
        LlmProvider::Gemini => &["SWITCHBOARD_LLM_API_KEY", "GEMINI_API_KEY"],
        LlmProvider::Ollama => &["SWITCHBOARD_LLM_API_KEY"],
    };

    vec![
        Field::new("llm.provider", enum_label(&config.llm.provider), &["SWITCHBOARD_LLM_PROVIDER"]),
        Field::new("llm.model", config.llm.model.clone(), &["SWITCHBOARD_LLM_MODEL"]),
        Field::new(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| {
                format!("<unset> (using {})", config.llm.provider.default_base_url())
            }),
            &["SWITCHBOARD_LLM_BASE_URL"],
        ),
        Field::new("llm.api_key", llm_api_key, api_key_env),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["SWITCHBOARD_LLM_TIMEOUT_SECS"],
        ),
        Field::new(
            "llm.max_retries",
            config.llm.max_retries.to_string(),
            &["SWITCHBOARD_LLM_MAX_RETRIES"],
        ),
        Field::new(
            "llm.retry_backoff_ms",
            config.llm.retry_backoff_ms.to_string(),
            &["SWITCHBOARD_LLM_RETRY_BACKOFF_MS"],
        ),
        Field::new(
            "router.classifier",
            enum_label(&config.router.classifier),
            &["SWITCHBOARD_ROUTER_CLASSIFIER"],
        ),
        Field::new(
            "router.input_gate",
            enum_label(&config.router.input_gate),
            &["SWITCHBOARD_ROUTER_INPUT_GATE"],
        ),
        Field::new(
            "router.output_gate",
            enum_label(&config.router.output_gate),
            &["SWITCHBOARD_ROUTER_OUTPUT_GATE"],
        ),
        Field::new(
            "router.compose_replies",
            config.router.compose_replies.to_string(),
            &["SWITCHBOARD_ROUTER_COMPOSE_REPLIES"],
        ),
        Field::new(
            "router.request_timeout_secs",
            config.router.request_timeout_secs.to_string(),
            &["SWITCHBOARD_ROUTER_REQUEST_TIMEOUT_SECS"],
        ),
        Field::new(
            "router.max_handoffs",
            config.router.max_handoffs.to_string(),
            &["SWITCHBOARD_ROUTER_MAX_HANDOFFS"],
        ),
        Field::new(
            "router.history_limit",
            config.router.history_limit.to_string(),
            &["SWITCHBOARD_ROUTER_HISTORY_LIMIT"],
        ),
        Field::new(
            "router.domain_terms",
            format!("{} terms", config.router.domain_terms.len()),
            &[],
        ),
        Field::new(
            "router.blocked_output_terms",
            format!("{} terms", config.router.blocked_output_terms.len()),
            &[],
        ),
        Field::new("messages.input_rejected", quoted(&config.messages.input_rejected), &[]),
        Field::new("messages.output_rejected", quoted(&config.messages.output_rejected), &[]),
        Field::new("messages.failure", quoted(&config.messages.failure), &[]),
        Field::new(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["SWITCHBOARD_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["SWITCHBOARD_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["SWITCHBOARD_LOGGING_LEVEL", "SWITCHBOARD_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            enum_label(&config.logging.format),
            &["SWITCHBOARD_LOGGING_FORMAT", "SWITCHBOARD_LOG_FORMAT"],
        ),
    ]
}

fn enum_label(value: &impl std::fmt::Debug) -> String {
    format!("{value:?}").to_ascii_lowercase()
}

fn quoted(value: &str) -> String {
    format!("{value:?}")
}

fn detect_config_path() -> Option<PathBuf> {
    ["switchboard.toml", "config/switchboard.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    match config_file_doc {
        Some(doc) if contains_path(doc, key_path) => {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            format!("file ({file_path})")
        }
        _ => "default".to_string(),
    }
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path
        .split('.')
        .try_fold(root, |current, key| current.get(key))
        .is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
