use std::time::Duration;

use tracing::info;

use crate::{ScriptError, ScriptRunner, applescript_string};

/// Both fields must carry something other than whitespace.
pub(crate) fn validate_outgoing(recipient: &str, message: &str) -> Result<(), String> {
    if recipient.trim().is_empty() {
        return Err("Recipient phone number or email is required".to_string());
    }
    if message.trim().is_empty() {
        return Err("Message text is required".to_string());
    }
    Ok(())
}

pub(crate) fn send_script(recipient: &str, message: &str) -> String {
    format!(
        r#"tell application "Messages"
    set targetService to 1st account whose service type = iMessage
    set targetBuddy to participant {recipient} of targetService
    send {message} to targetBuddy
end tell"#,
        recipient = applescript_string(recipient.trim()),
        message = applescript_string(message),
    )
}

/// Hand the message to Messages.app over the iMessage service.
pub(crate) fn send_imessage(
    runner: &dyn ScriptRunner,
    recipient: &str,
    message: &str,
    timeout: Duration,
) -> Result<(), ScriptError> {
    runner.run(&send_script(recipient, message), timeout)?;
    info!(recipient = recipient.trim(), chars = message.chars().count(), "imessage sent");
    Ok(())
}
