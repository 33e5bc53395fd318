//! Error types for the message store, the AppleScript runner and configuration.
//!
//! Tool handlers convert these into strings (or `{ "error": ... }` payloads)
//! at the dispatch boundary; everything below that propagates them with `?`.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading the local message database.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("iMessages database not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid date '{0}': expected ISO-8601 or an Apple epoch integer")]
    InvalidDate(String),

    #[error("invalid sort order '{0}': expected ASC or DESC")]
    InvalidOrder(String),
}

/// Remediation shown when macOS refuses automation access to Contacts.
pub(crate) const CONTACTS_REMEDIATION: [&str; 4] = [
    "Open System Settings > Privacy & Security > Automation",
    "Find the terminal or MCP host application in the list",
    "Enable the 'Contacts' checkbox underneath it",
    "Restart the MCP server and try again",
];

/// Failures produced by the `osascript` invocation wrapper.
///
/// The variant is decided by the wrapper itself: a deadline flag, the exit
/// status, and the AppleScript error number parsed from stderr.
#[derive(Debug, Error)]
pub(crate) enum ScriptError {
    #[error("not authorized to control the target application (AppleScript error {code})")]
    PermissionDenied {
        code: i32,
        remediation: &'static [&'static str],
    },

    #[error("automation call timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("osascript exited with {status}: {stderr}")]
    Failed {
        status: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start osascript: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("unreadable automation output: {0}")]
    Decode(#[from] DecodeError),
}

/// Malformed text from the contacts script.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum DecodeError {
    #[error("missing DATA/EMPTY header")]
    MissingHeader,

    #[error("bad header line '{0}'")]
    BadHeader(String),

    #[error("expected a number, got '{0}'")]
    BadNumber(String),
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
