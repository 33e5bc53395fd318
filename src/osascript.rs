use std::io::{ErrorKind, Read, Write};
use std::process::{ChildStderr, ChildStdout, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::{
    CONTACTS_REMEDIATION, ScriptError, build_external_command, env_optional, exit_status_label,
    kill_process_tree,
};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// AppleScript error numbers for "not authorized to send Apple events".
const PERMISSION_ERROR_CODES: [i32; 2] = [-1743, -1744];

/// Runs an AppleScript source text and returns its stdout.
pub(crate) trait ScriptRunner {
    fn run(&self, script: &str, timeout: Duration) -> Result<String, ScriptError>;
}

/// `osascript -` subprocess runner; the script is written to stdin.
#[derive(Debug, Clone)]
pub(crate) struct OsaScript {
    program: String,
    args: Vec<String>,
}

impl OsaScript {
    pub(crate) fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub(crate) fn from_env() -> Self {
        let program =
            env_optional("IMESSAGE_MCP_OSASCRIPT").unwrap_or_else(|| "osascript".to_string());
        Self::new(program, vec!["-".to_string()])
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

impl ScriptRunner for OsaScript {
    fn run(&self, script: &str, timeout: Duration) -> Result<String, ScriptError> {
        let mut cmd = build_external_command(&self.program, &self.args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        debug!(program = %self.program, pid = child.id(), ?timeout, "script started");

        let stdout: JoinHandle<String> = spawn_pipe_reader::<ChildStdout>(child.stdout.take());
        let stderr: JoinHandle<String> = spawn_pipe_reader::<ChildStderr>(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(script.as_bytes()) {
                Ok(()) => {}
                // Exited before reading everything; the exit status tells the rest.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {}
                Err(err) => {
                    kill_process_tree(&mut child);
                    return Err(ScriptError::Spawn(err));
                }
            }
        }

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                kill_process_tree(&mut child);
                debug!(program = %self.program, "script timed out");
                return Err(ScriptError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);
        if status.success() {
            return Ok(stdout);
        }
        Err(classify_failure(
            exit_status_label(&status),
            status.code(),
            stderr,
        ))
    }
}

/// The AppleScript error number osascript prints as a trailing `(-NNNN)`.
pub(crate) fn applescript_error_number(stderr: &str) -> Option<i32> {
    stderr.rsplit('(').find_map(|segment| {
        let (number, _) = segment.split_once(')')?;
        number.trim().parse::<i32>().ok()
    })
}

pub(crate) fn classify_failure(status: String, code: Option<i32>, stderr: String) -> ScriptError {
    match applescript_error_number(&stderr) {
        Some(number) if PERMISSION_ERROR_CODES.contains(&number) => ScriptError::PermissionDenied {
            code: number,
            remediation: &CONTACTS_REMEDIATION,
        },
        _ => ScriptError::Failed {
            status,
            code,
            stderr: stderr.trim().to_string(),
        },
    }
}

/// Quote a value as an AppleScript string literal.
pub(crate) fn applescript_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
