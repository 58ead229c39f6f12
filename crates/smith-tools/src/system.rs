//! System tool category: notifications, clipboard, and openers.
//!
//! Each tool is a small OS-branched argv table dispatched on the adapter's
//! platform tag. Clipboard writes are destructive under read-only mode.

use std::time::Duration;

use serde_json::{json, Value};
use smith_shell::{Platform, RunOptions, ShellAdapter};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_str, req_str, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::guard::{ensure_writable, guarded_path, truncate_output};

/// System helpers are quick; cap them well under the general budget.
const SYSTEM_TIMEOUT: Duration = Duration::from_secs(10);

/// All system tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(Notify),
        Box::new(ClipboardRead),
        Box::new(ClipboardWrite),
        Box::new(OpenUrl),
        Box::new(OpenFile),
    ]
}

async fn run_helper(
    cmd: &str,
    args: &[String],
    stdin: Option<String>,
) -> Result<smith_shell::RunResult, SmithError> {
    let adapter = ShellAdapter::new();
    let result = adapter
        .run(
            cmd,
            args,
            &RunOptions {
                timeout: SYSTEM_TIMEOUT,
                stdin,
                ..RunOptions::default()
            },
        )
        .await;
    if result.timed_out {
        return Err(SmithError::ToolFailure(format!("{cmd} timed out")));
    }
    Ok(result)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// notify
// ---------------------------------------------------------------------------

struct Notify;

#[async_trait::async_trait]
impl Tool for Notify {
    fn name(&self) -> &str {
        "notify"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }
    fn description(&self) -> &str {
        "Show a desktop notification"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("message", ArgKind::Str),
            ArgSpec::optional("title", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let message = req_str(args, "message")?;
        let title = opt_str(args, "title").unwrap_or("smith");

        let (cmd, argv) = match Platform::current() {
            Platform::Linux => (
                "notify-send",
                vec![title.to_string(), message.to_string()],
            ),
            Platform::MacOs => (
                "osascript",
                vec![
                    "-e".to_string(),
                    format!(
                        "display notification \"{}\" with title \"{}\"",
                        message.replace('"', "\\\""),
                        title.replace('"', "\\\"")
                    ),
                ],
            ),
            Platform::Windows => (
                "msg",
                vec!["*".to_string(), format!("{title}: {message}")],
            ),
        };

        let result = run_helper(cmd, &argv, None).await?;
        if result.exit_code != 0 {
            return Err(SmithError::ToolFailure(format!(
                "notification failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(json!({ "notified": true }))
    }
}

// ---------------------------------------------------------------------------
// clipboard
// ---------------------------------------------------------------------------

struct ClipboardRead;

#[async_trait::async_trait]
impl Tool for ClipboardRead {
    fn name(&self) -> &str {
        "clipboard_read"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }
    fn description(&self) -> &str {
        "Read the system clipboard as text"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        &[]
    }

    async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let (cmd, argv) = match Platform::current() {
            Platform::Linux => ("xclip", strings(&["-selection", "clipboard", "-o"])),
            Platform::MacOs => ("pbpaste", Vec::new()),
            Platform::Windows => ("powershell", strings(&["-NoProfile", "-Command", "Get-Clipboard"])),
        };
        let result = run_helper(cmd, &argv, None).await?;
        if result.exit_code != 0 {
            return Err(SmithError::ToolFailure(format!(
                "clipboard read failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(json!({ "content": truncate_output(&result.stdout) }))
    }
}

struct ClipboardWrite;

#[async_trait::async_trait]
impl Tool for ClipboardWrite {
    fn name(&self) -> &str {
        "clipboard_write"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }
    fn description(&self) -> &str {
        "Replace the system clipboard contents"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("content", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        ensure_writable(ctx, "clipboard_write")?;
        let content = req_str(args, "content")?;

        let (cmd, argv) = match Platform::current() {
            Platform::Linux => ("xclip", strings(&["-selection", "clipboard"])),
            Platform::MacOs => ("pbcopy", Vec::new()),
            Platform::Windows => (
                "powershell",
                strings(&["-NoProfile", "-Command", "$input | Set-Clipboard"]),
            ),
        };
        let result = run_helper(cmd, &argv, Some(content.to_string())).await?;
        if result.exit_code != 0 {
            return Err(SmithError::ToolFailure(format!(
                "clipboard write failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(json!({ "bytes_written": content.len() }))
    }
}

// ---------------------------------------------------------------------------
// open_url / open_file
// ---------------------------------------------------------------------------

fn opener() -> (&'static str, Vec<String>) {
    match Platform::current() {
        Platform::Linux => ("xdg-open", Vec::new()),
        Platform::MacOs => ("open", Vec::new()),
        Platform::Windows => ("cmd", strings(&["/C", "start", ""])),
    }
}

struct OpenUrl;

#[async_trait::async_trait]
impl Tool for OpenUrl {
    fn name(&self) -> &str {
        "open_url"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }
    fn description(&self) -> &str {
        "Open a URL with the default browser"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("url", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let url = req_str(args, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SmithError::BadArguments(format!(
                "only http(s) URLs can be opened, got {url:?}"
            )));
        }
        let (cmd, mut argv) = opener();
        argv.push(url.to_string());
        let result = run_helper(cmd, &argv, None).await?;
        if result.exit_code != 0 {
            return Err(SmithError::ToolFailure(format!(
                "open failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(json!({ "opened": url }))
    }
}

struct OpenFile;

#[async_trait::async_trait]
impl Tool for OpenFile {
    fn name(&self) -> &str {
        "open_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::System
    }
    fn description(&self) -> &str {
        "Open a sandboxed file with the default application"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("path", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "path")?, None)?;
        if !path.exists() {
            return Err(SmithError::ToolFailure(format!(
                "no such file: {}",
                path.display()
            )));
        }
        let (cmd, mut argv) = opener();
        argv.push(path.display().to_string());
        let result = run_helper(cmd, &argv, None).await?;
        if result.exit_code != 0 {
            return Err(SmithError::ToolFailure(format!(
                "open failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(json!({ "opened": path.display().to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smith_types::AgentConfig;
    use std::path::Path;

    fn ctx(dir: &Path, readonly: bool) -> ToolContext {
        let mut config = AgentConfig::default_for("sys", dir.to_path_buf());
        config.readonly_mode = readonly;
        ToolContext::from_config(&config)
    }

    #[tokio::test]
    async fn clipboard_write_is_destructive() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path(), true);
        let err = ClipboardWrite
            .execute(&json!({"content": "secret"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn open_url_rejects_non_http_schemes() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path(), false);
        for url in ["file:///etc/passwd", "javascript:alert(1)", "ftp://x"] {
            let err = OpenUrl.execute(&json!({"url": url}), &ctx).await.unwrap_err();
            assert!(err.to_string().contains("http"), "{url} should be rejected");
        }
    }

    #[tokio::test]
    async fn open_file_is_sandbox_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path(), false);
        let err = OpenFile
            .execute(&json!({"path": "/etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the sandbox"));
    }

    #[tokio::test]
    async fn open_file_requires_existing_target() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path(), false);
        let err = OpenFile
            .execute(&json!({"path": "ghost.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such file"));
    }
}
