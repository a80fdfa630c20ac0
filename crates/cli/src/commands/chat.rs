use std::io::{BufRead, Write};

use switchboard_agent::{RouteOutcome, RouterBuilder};
use switchboard_core::config::{AppConfig, LoadOptions};

use crate::commands::{
    current_thread_runtime, CallerArgs, CommandResult, EXIT_BUILD, EXIT_CONFIG, EXIT_RUNTIME,
};

const EXIT_WORDS: [&str; 2] = ["quit", "exit"];

pub fn run(caller: &CallerArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_with_io(config, caller, stdin.lock(), stdout.lock())
}

pub fn run_with_io<R, W>(config: AppConfig, caller: &CallerArgs, input: R, mut output: W) -> CommandResult
where
    R: BufRead,
    W: Write,
{
    let service = match RouterBuilder::new(config).build() {
        Ok(service) => service,
        Err(error) => return CommandResult::failure("chat", "router_build", error.to_string(), EXIT_BUILD),
    };
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        }
    };

    let caller = caller.to_context();
    let _ = writeln!(
        output,
        "Hi {}! Ask about billing, products or technical issues. Type `quit` or `exit` to leave.",
        caller.name
    );

    let mut exchanges = 0usize;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                return CommandResult::failure("chat", "io", error.to_string(), EXIT_RUNTIME);
            }
        };
        if EXIT_WORDS.contains(&line.trim().to_lowercase().as_str()) {
            break;
        }

        let outcome = runtime.block_on(service.handle(caller.clone(), line, None));
        exchanges += 1;
        let _ = writeln!(output, "{}", render_turn(&outcome));
    }

    let _ = output.flush();
    let remembered =
        runtime.block_on(service.history(&caller.caller_id)).map_or(0, |history| history.len());
    CommandResult::success(
        "chat",
        format!("session ended after {exchanges} messages ({remembered} turns kept in history)"),
    )
}

fn render_turn(outcome: &RouteOutcome) -> String {
    let category = outcome.category.map(|category| category.as_str()).unwrap_or("-");
    match &outcome.response {
        Some(response) => format!("[{category} -> {}] {}", response.handler, outcome.reply),
        None => format!("[{category} | {}] {}", outcome.status.as_str(), outcome.reply),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use switchboard_core::config::AppConfig;

    use super::run_with_io;
    use crate::commands::CallerArgs;

    #[test]
    fn loop_stops_at_exit_word_and_labels_turns() {
        let input = Cursor::new("I want a refund\nwhat is the price of a pencil\nEXIT\nnever routed\n");
        let mut output = Vec::new();
        let caller = CallerArgs { premium: true, account: Some("ACC-1002".to_string()), ..CallerArgs::default() };

        let result = run_with_io(AppConfig::default(), &caller, input, &mut output);
        let transcript = String::from_utf8(output).expect("utf8 output");

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("session ended after 2 messages (4 turns kept in history)"));
        assert!(transcript.contains("[billing -> billing] Refund of 250.00 processed for Guest on account ACC-1002."));
        assert!(transcript.contains("[product -> product] pencil: 250 each"));
        assert!(!transcript.contains("never routed"));
    }

    #[test]
    fn rejected_turns_show_status_instead_of_handler() {
        let input = Cursor::new("Help me solve my math homework: 2x + 3 = 11\nquit\n");
        let mut output = Vec::new();

        let result = run_with_io(AppConfig::default(), &CallerArgs::default(), input, &mut output);
        let transcript = String::from_utf8(output).expect("utf8 output");

        assert!(result.output.contains("(0 turns kept in history)"));
        assert!(transcript.contains("[- | input_rejected] Sorry, I can only help with"));
    }
}
