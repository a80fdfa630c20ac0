use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use switchboard_cli::commands::{ask, config, smoke, CallerArgs};

#[test]
fn ask_delivers_reply_as_json() {
    with_env(&[], || {
        let caller = CallerArgs {
            premium: true,
            account: Some("ACC-1002".to_string()),
            name: "Hania".to_string(),
            ..CallerArgs::default()
        };
        let result = ask::run("I want a refund", &caller, true);
        assert_eq!(result.exit_code, 0, "expected delivered refund");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "delivered");
        assert_eq!(payload["category"], "billing");
        assert_eq!(payload["handler"], "billing");
        assert!(payload["correlation_id"].as_str().unwrap_or_default().starts_with("req-"));
        assert!(payload["reply"].as_str().unwrap_or_default().contains("ACC-1002"));
    });
}

#[test]
fn ask_prints_plain_reply_for_rejected_input() {
    with_env(&[], || {
        let result = ask::run("What's the weather like on Mars?", &CallerArgs::default(), false);
        assert_eq!(result.exit_code, 0, "a rejection is still an answered request");
        assert!(result.output.starts_with("Sorry, I can only help with"));
    });
}

#[test]
fn ask_reports_config_failure() {
    with_env(&[("SWITCHBOARD_ROUTER_MAX_HANDOFFS", "0")], || {
        let result = ask::run("I want a refund", &CallerArgs::default(), false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(
        &[("SWITCHBOARD_ROUTER_MAX_HANDOFFS", "5"), ("SWITCHBOARD_LOG_FORMAT", "json")],
        || {
            let output = config::run();
            assert!(output.starts_with("effective config"));
            assert!(output
                .contains("- router.max_handoffs = 5 (source: env (SWITCHBOARD_ROUTER_MAX_HANDOFFS))"));
            assert!(output.contains("- logging.format = json (source: env (SWITCHBOARD_LOG_FORMAT))"));
            assert!(output.contains("- router.classifier = keyword (source: default)"));
            assert!(output.contains("- llm.api_key = <unset>"));
        },
    );
}

#[test]
fn config_redacts_api_key() {
    with_env(&[("SWITCHBOARD_LLM_API_KEY", "sk-should-not-leak")], || {
        let output = config::run();
        assert!(output.contains("- llm.api_key = <redacted> (source: env (SWITCHBOARD_LLM_API_KEY))"));
        assert!(!output.contains("sk-should-not-leak"));
    });
}

#[test]
fn smoke_returns_success_report_with_defaults() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("SWITCHBOARD_ROUTER_HISTORY_LIMIT", "1")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SWITCHBOARD_LLM_PROVIDER",
        "SWITCHBOARD_LLM_API_KEY",
        "SWITCHBOARD_LLM_BASE_URL",
        "SWITCHBOARD_LLM_MODEL",
        "SWITCHBOARD_LLM_TIMEOUT_SECS",
        "SWITCHBOARD_LLM_MAX_RETRIES",
        "SWITCHBOARD_LLM_RETRY_BACKOFF_MS",
        "SWITCHBOARD_ROUTER_CLASSIFIER",
        "SWITCHBOARD_ROUTER_INPUT_GATE",
        "SWITCHBOARD_ROUTER_OUTPUT_GATE",
        "SWITCHBOARD_ROUTER_COMPOSE_REPLIES",
        "SWITCHBOARD_ROUTER_REQUEST_TIMEOUT_SECS",
        "SWITCHBOARD_ROUTER_MAX_HANDOFFS",
        "SWITCHBOARD_ROUTER_HISTORY_LIMIT",
        "SWITCHBOARD_SERVER_BIND_ADDRESS",
        "SWITCHBOARD_SERVER_PORT",
        "SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SWITCHBOARD_LOGGING_LEVEL",
        "SWITCHBOARD_LOGGING_FORMAT",
        "SWITCHBOARD_LOG_LEVEL",
        "SWITCHBOARD_LOG_FORMAT",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
