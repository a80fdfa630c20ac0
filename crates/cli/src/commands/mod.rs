pub mod ask;
pub mod chat;
pub mod config;
pub mod smoke;

use clap::Args;
use serde::Serialize;
use switchboard_core::domain::caller::CallerContext;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_BUILD: u8 = 3;
pub const EXIT_RUNTIME: u8 = 4;
pub const EXIT_ROUTE_FAILED: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Who is talking. The CLI trusts these flags the way the server trusts its front end.
#[derive(Debug, Clone, Args)]
pub struct CallerArgs {
    #[arg(long, default_value = "cli-user", help = "Stable caller id used to scope history")]
    pub caller_id: String,
    #[arg(long, default_value = "Guest", help = "Caller display name")]
    pub name: String,
    #[arg(long, help = "Treat the caller as a premium member")]
    pub premium: bool,
    #[arg(long, help = "Treat the caller as signed in")]
    pub authenticated: bool,
    #[arg(long, help = "Default account id, e.g. ACC-1002")]
    pub account: Option<String>,
    #[arg(long, help = "Library membership number, e.g. 231")]
    pub member_id: Option<String>,
}

impl Default for CallerArgs {
    fn default() -> Self {
        Self {
            caller_id: "cli-user".to_string(),
            name: "Guest".to_string(),
            premium: false,
            authenticated: false,
            account: None,
            member_id: None,
        }
    }
}

impl CallerArgs {
    pub fn to_context(&self) -> CallerContext {
        let mut caller = CallerContext::new(self.caller_id.clone(), self.name.clone());
        if self.premium {
            caller = caller.premium();
        }
        if self.authenticated {
            caller = caller.authenticated();
        }
        if let Some(account) = &self.account {
            caller = caller.with_account(account.clone());
        }
        if let Some(member_id) = &self.member_id {
            caller = caller.with_member_id(member_id.clone());
        }
        caller
    }
}

fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}
