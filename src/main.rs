// Module declarations
mod cli;
mod config;
mod contacts;
mod error;
mod http;
mod mcp;
mod message_db;
mod osascript;
mod outbox;
mod tool_args;
mod tool_defs;
mod tool_exec;
mod types;
mod util;

// Every module's items live at the crate root so cross-module references stay
// short (`crate::MessageStore`, `crate::ScriptError`, ...).
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use contacts::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use http::*;
#[allow(unused_imports)]
pub(crate) use mcp::*;
#[allow(unused_imports)]
pub(crate) use message_db::*;
#[allow(unused_imports)]
pub(crate) use osascript::*;
#[allow(unused_imports)]
pub(crate) use outbox::*;
#[allow(unused_imports)]
pub(crate) use tool_args::*;
#[allow(unused_imports)]
pub(crate) use tool_defs::*;
#[allow(unused_imports)]
pub(crate) use tool_exec::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Logs go to stderr; stdout is reserved for JSON-RPC.
fn init_tracing() {
    let filter = env_optional("IMESSAGE_MCP_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = resolve_config(&cli.overrides())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let mut ctx = ToolContext::from_config(&config);
            run_mcp_server(&mut ctx)
        }

        Command::ServeHttp { host, port } => {
            if let Some(host) = host {
                config.http.host = host;
            }
            if let Some(port) = port {
                config.http.port = port;
            }
            let mut ctx = ToolContext::from_config(&config);
            run_http_server(&config.http, &mut ctx)
        }

        Command::Tools => {
            let tools = tool_definitions_json(config.contacts_enabled);
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }

        Command::Call { tool, args } => {
            let args: serde_json::Value = serde_json::from_str(&args)?;
            let mut ctx = ToolContext::from_config(&config);
            let result = execute_tool(&tool, args, &mut ctx)?;
            println!("{}", result.output);
            if result.is_error {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
