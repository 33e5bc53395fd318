use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "imessage-mcp")]
#[command(about = "MCP tool server over the local iMessage database and macOS Contacts", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Path to chat.db (default: $IMESSAGES_DB_PATH or ~/Library/Messages/chat.db)
    #[arg(long, global = true)]
    pub(crate) db: Option<PathBuf>,

    /// JSON config file with contacts timeouts and HTTP bind settings
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Expose the Contacts tools
    #[arg(long, global = true, conflicts_with = "no_contacts")]
    pub(crate) contacts: bool,

    /// Hide the Contacts tools
    #[arg(long, global = true)]
    pub(crate) no_contacts: bool,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

impl Cli {
    pub(crate) fn overrides(&self) -> ConfigOverrides {
        let contacts = match (self.contacts, self.no_contacts) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigOverrides {
            db: self.db.clone(),
            config: self.config.clone(),
            contacts,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    /// Serve MCP over stdio (the default).
    Serve,

    /// Serve MCP over HTTP (POST /mcp).
    ServeHttp {
        /// Bind address (default 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
        /// Port (default 8008)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the tool catalog as JSON.
    Tools,

    /// Run a single tool and print its result.
    Call {
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}
