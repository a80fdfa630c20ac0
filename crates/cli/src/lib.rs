pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::CallerArgs;

#[derive(Debug, Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard support router CLI",
    long_about = "Route customer utterances through the input gate, classifier, handlers and output gate, inspect configuration, and run readiness checks.",
    after_help = "Examples:\n  switchboard ask \"I want a refund\" --premium --account ACC-1002\n  switchboard chat --name Hania\n  switchboard config\n  switchboard smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Route a single utterance and print the reply")]
    Ask {
        #[arg(help = "What the caller said")]
        text: String,
        #[command(flatten)]
        caller: CallerArgs,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Start an interactive session that keeps conversation history")]
    Chat {
        #[command(flatten)]
        caller: CallerArgs,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run offline readiness probes with per-check timing details")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { text, caller, json } => commands::ask::run(&text, &caller, json),
        Command::Chat { caller } => commands::chat::run(&caller),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
