use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};

use tracing::warn;

use auh_core::{Notifier, OutgoingMessage, ToolError, ToolResult};

const MIME_BOUNDARY: &str = "=-=auh-attachment-boundary=-=";

/// Notification collaborator that pipes composed messages into a
/// `sendmail`-compatible transport. Recipients are taken from the message
/// headers (`-t`).
#[derive(Debug, Clone)]
pub struct Sendmail {
    command: String,
}

impl Default for Sendmail {
    fn default() -> Self {
        Self {
            command: "sendmail".to_string(),
        }
    }
}

impl Sendmail {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Notifier for Sendmail {
    fn send(&self, message: &OutgoingMessage) -> ToolResult<()> {
        let mut child = Command::new(&self.command)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ToolError::new(
                    &self.command,
                    "send",
                    format!("failed launching {}: {err}", self.command),
                    "",
                )
            })?;

        let rendered = render_message(message);
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(rendered.as_bytes()).map_err(|err| {
                ToolError::new(&self.command, "send", format!("failed writing message: {err}"), "")
            })?;
        }

        let output = child.wait_with_output().map_err(|err| {
            ToolError::new(&self.command, "send", format!("failed awaiting transport: {err}"), "")
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let summary = stderr
                .lines()
                .next()
                .unwrap_or("non-zero exit status")
                .to_string();
            return Err(ToolError::new(&self.command, "send", summary, stderr));
        }

        Ok(())
    }
}

/// Renders the message as RFC 822 text, multipart when attachments are
/// present. Upgrade artifacts are logs and patches, so attachments are
/// carried as text parts; unreadable ones are dropped with a warning
/// rather than failing delivery.
pub fn render_message(message: &OutgoingMessage) -> String {
    let mut rendered = String::new();
    rendered.push_str(&format!("From: {}\n", message.from));
    rendered.push_str(&format!("To: {}\n", message.to.join(", ")));
    if !message.cc.is_empty() {
        rendered.push_str(&format!("Cc: {}\n", message.cc.join(", ")));
    }
    rendered.push_str(&format!("Subject: {}\n", message.subject));

    if message.attachments.is_empty() {
        rendered.push('\n');
        rendered.push_str(&message.body);
        return rendered;
    }

    rendered.push_str("MIME-Version: 1.0\n");
    rendered.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{MIME_BOUNDARY}\"\n\n"
    ));
    rendered.push_str(&format!("--{MIME_BOUNDARY}\n"));
    rendered.push_str("Content-Type: text/plain; charset=utf-8\n\n");
    rendered.push_str(&message.body);
    rendered.push('\n');

    for attachment in &message.attachments {
        let content = match fs::read(attachment) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(err) => {
                warn!(
                    path = %attachment.display(),
                    %err,
                    "dropping unreadable attachment"
                );
                continue;
            }
        };
        let name = attachment
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "attachment".to_string());

        rendered.push_str(&format!("--{MIME_BOUNDARY}\n"));
        rendered.push_str(&format!(
            "Content-Type: text/plain; charset=utf-8; name=\"{name}\"\n"
        ));
        rendered.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{name}\"\n\n"
        ));
        rendered.push_str(&content);
        rendered.push('\n');
    }
    rendered.push_str(&format!("--{MIME_BOUNDARY}--\n"));

    rendered
}
