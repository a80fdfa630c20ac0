use std::time::Instant;

use serde::Serialize;
use switchboard_agent::{ConversationService, RouteStatus, RouterBuilder};
use switchboard_core::config::{AppConfig, LoadOptions};
use switchboard_core::domain::caller::CallerContext;

use crate::commands::{current_thread_runtime, CommandResult};

const EXIT_SMOKE_FAILED: u8 = 6;

const ROUTING_PROBE: &str = "What is the price of a notebook?";
const GATE_PROBE: &str = "Help me solve my math homework: 2x + 3 = 11";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => run_with_config(Ok(config)),
        Err(error) => run_with_config(Err(error.to_string())),
    }
}

/// Runs the readiness checks against an already loaded configuration.
pub fn run_with_config(config: Result<AppConfig, String>) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match config {
        Ok(config) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms: elapsed_ms(started),
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err(message) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms: elapsed_ms(started),
                message,
            });
            checks.extend(["router_build", "routing_probe", "gate_probe", "provider"].map(skipped));
            return finalize_report(checks, elapsed_ms(started));
        }
    };

    let uses_provider = config.router.uses_provider();
    let provider_label = format!("{:?}", config.llm.provider).to_ascii_lowercase();
    let model = config.llm.model.clone();

    let service = match timed_check(|| RouterBuilder::new(config).build()) {
        Ok((build_ms, service)) => {
            checks.push(SmokeCheck {
                name: "router_build",
                status: SmokeStatus::Pass,
                elapsed_ms: build_ms,
                message: "gates, classifier, handlers and tools are wired".to_string(),
            });
            service
        }
        Err((build_ms, error)) => {
            checks.push(SmokeCheck {
                name: "router_build",
                status: SmokeStatus::Fail,
                elapsed_ms: build_ms,
                message: error.to_string(),
            });
            checks.extend(["routing_probe", "gate_probe", "provider"].map(skipped));
            return finalize_report(checks, elapsed_ms(started));
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "routing_probe",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(["gate_probe", "provider"].map(skipped));
            return finalize_report(checks, elapsed_ms(started));
        }
    };

    checks.push(runtime.block_on(probe(
        &service,
        "routing_probe",
        ROUTING_PROBE,
        RouteStatus::Delivered,
    )));
    checks.push(runtime.block_on(probe(
        &service,
        "gate_probe",
        GATE_PROBE,
        RouteStatus::InputRejected,
    )));

    checks.push(if uses_provider {
        SmokeCheck {
            name: "provider",
            status: SmokeStatus::Pass,
            elapsed_ms: 0,
            message: format!("{provider_label} client configured for model `{model}`"),
        }
    } else {
        SmokeCheck {
            name: "provider",
            status: SmokeStatus::Skipped,
            elapsed_ms: 0,
            message: "no stage uses the provider strategy".to_string(),
        }
    });

    finalize_report(checks, elapsed_ms(started))
}

async fn probe(
    service: &ConversationService,
    name: &'static str,
    utterance: &str,
    expected: RouteStatus,
) -> SmokeCheck {
    let started = Instant::now();
    let caller = CallerContext::new(format!("smoke-{name}"), "Smoke Probe");
    let outcome = service.handle(caller, utterance, None).await;
    let probe_ms = elapsed_ms(started);

    if outcome.status == expected {
        SmokeCheck {
            name,
            status: SmokeStatus::Pass,
            elapsed_ms: probe_ms,
            message: format!("`{utterance}` -> {}", outcome.status.as_str()),
        }
    } else {
        SmokeCheck {
            name,
            status: SmokeStatus::Fail,
            elapsed_ms: probe_ms,
            message: format!(
                "expected {} for `{utterance}`, got {} ({})",
                expected.as_str(),
                outcome.status.as_str(),
                outcome.correlation_id
            ),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed_ms(started), value)),
        Err(error) => Err((elapsed_ms(started), error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if failed { EXIT_SMOKE_FAILED } else { 0 },
        output: format!("{human}\n{machine}"),
    }
}
