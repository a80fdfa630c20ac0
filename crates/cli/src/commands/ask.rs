use serde::Serialize;
use switchboard_agent::{RouteOutcome, RouteStatus, RouterBuilder};
use switchboard_core::config::{AppConfig, LoadOptions};

use crate::commands::{
    current_thread_runtime, CallerArgs, CommandResult, EXIT_BUILD, EXIT_CONFIG,
    EXIT_ROUTE_FAILED, EXIT_RUNTIME,
};

#[derive(Debug, Serialize)]
struct AskReport<'a> {
    command: &'static str,
    status: &'static str,
    correlation_id: &'a str,
    category: Option<&'static str>,
    handler: Option<&'a str>,
    reply: &'a str,
}

pub fn run(text: &str, caller: &CallerArgs, json: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("ask", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    run_with_config(config, text, caller, json)
}

pub fn run_with_config(config: AppConfig, text: &str, caller: &CallerArgs, json: bool) -> CommandResult {
    let service = match RouterBuilder::new(config).build() {
        Ok(service) => service,
        Err(error) => return CommandResult::failure("ask", "router_build", error.to_string(), EXIT_BUILD),
    };
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        }
    };

    let outcome = runtime.block_on(service.handle(caller.to_context(), text, None));
    let exit_code = exit_code_for(&outcome);
    let output = if json { render_json(&outcome) } else { outcome.reply.clone() };
    CommandResult { exit_code, output }
}

fn exit_code_for(outcome: &RouteOutcome) -> u8 {
    match outcome.status {
        RouteStatus::Delivered | RouteStatus::InputRejected | RouteStatus::OutputRejected => 0,
        RouteStatus::ProviderFailure | RouteStatus::Failed => EXIT_ROUTE_FAILED,
    }
}

fn render_json(outcome: &RouteOutcome) -> String {
    let report = AskReport {
        command: "ask",
        status: outcome.status.as_str(),
        correlation_id: &outcome.correlation_id,
        category: outcome.category.map(|category| category.as_str()),
        handler: outcome.response.as_ref().map(|response| response.handler.as_str()),
        reply: &outcome.reply,
    };
    serde_json::to_string(&report).unwrap_or_else(|_| outcome.reply.clone())
}
