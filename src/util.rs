use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command as ProcessCommand;
use std::sync::OnceLock;

use crate::ConfigError;

static DOTENV_VALUES: OnceLock<HashMap<String, String>> = OnceLock::new();

/// Parse `KEY=value` lines. Comments, blank lines and an `export ` prefix are
/// accepted; matching single or double quotes around the value are stripped.
pub(crate) fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let content = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = content.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                value = &value[1..value.len() - 1];
                break;
            }
        }
        values.insert(key.to_string(), value.to_string());
    }
    values
}

fn load_dotenv_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv_contents(&contents)
}

fn dotenv_values() -> &'static HashMap<String, String> {
    DOTENV_VALUES.get_or_init(|| load_dotenv_file(Path::new(".env")))
}

/// Process environment first, then `./.env`. Blank values count as unset.
pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .or_else(|| dotenv_values().get(name).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub(crate) fn parse_u64_value(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}

pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

pub(crate) fn command_wrapper() -> Option<Vec<String>> {
    env_optional("IMESSAGE_MCP_COMMAND_WRAPPER")
        .and_then(|raw| shlex::split(&raw))
        .filter(|parts| !parts.is_empty())
}

pub(crate) fn build_external_command(program: &str, args: &[String]) -> ProcessCommand {
    let mut cmd = if let Some(wrapper) = command_wrapper() {
        let mut c = ProcessCommand::new(&wrapper[0]);
        c.args(&wrapper[1..]).arg(program).args(args);
        c
    } else {
        let mut c = ProcessCommand::new(program);
        c.args(args);
        c
    };

    // Own process group so a timed-out script can be killed with its children.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd
}

/// Kill a child process and its entire process group.
#[cfg(unix)]
pub(crate) fn kill_process_tree(child: &mut std::process::Child) {
    let pid = child.id() as i32;
    unsafe {
        libc::killpg(pid, libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
pub(crate) fn kill_process_tree(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Describe an exit status; on Unix, names the signal when there is no code.
pub(crate) fn exit_status_label(status: &std::process::ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            format!("exit code {code}")
        } else if let Some(sig) = status.signal() {
            format!("signal {sig}")
        } else {
            "unknown status".to_string()
        }
    }
    #[cfg(not(unix))]
    {
        match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "unknown status".to_string(),
        }
    }
}
