//! Shell tool category: run_command, run_script, which.
//!
//! Every spawn goes through the shared [`ShellAdapter`]; the allowlist is
//! checked before anything is spawned.

use std::time::Duration;

use serde_json::{json, Value};
use smith_shell::{RunOptions, RunResult, ShellAdapter};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_str, req_str, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::executor::effective_timeout_ms;
use crate::guard::{ensure_command_allowed, resolve_in_sandbox, truncate_output};

/// Script runtimes run_script accepts.
const SCRIPT_RUNTIMES: &[(&str, &str)] = &[
    ("bash", ".sh"),
    ("sh", ".sh"),
    ("node", ".js"),
    ("python3", ".py"),
];

/// All shell tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![Box::new(RunCommand), Box::new(RunScript), Box::new(Which)]
}

/// Shape a finished subprocess into tool result data. A timed-out run is
/// reported as an embedded failure record so the envelope carries both
/// `success: false` and the structured `timed_out` flag.
fn run_result_data(cmd: &str, result: RunResult, timeout_ms: u64) -> Value {
    if result.timed_out {
        return json!({
            "success": false,
            "error": format!("{cmd} timed out after {timeout_ms}ms"),
            "exit_code": result.exit_code,
            "stdout": truncate_output(&result.stdout),
            "stderr": truncate_output(&result.stderr),
            "timed_out": true,
        });
    }
    json!({
        "exit_code": result.exit_code,
        "stdout": truncate_output(&result.stdout),
        "stderr": truncate_output(&result.stderr),
        "timed_out": false,
    })
}

// ---------------------------------------------------------------------------
// run_command
// ---------------------------------------------------------------------------

struct RunCommand;

#[async_trait::async_trait]
impl Tool for RunCommand {
    fn name(&self) -> &str {
        "run_command"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }
    fn description(&self) -> &str {
        "Run an allowlisted binary with arguments inside the sandbox"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("command", ArgKind::Str),
            ArgSpec::optional("args", ArgKind::List),
            ArgSpec::optional("cwd", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let command = req_str(args, "command")?;
        ensure_command_allowed(ctx, command)?;

        let cwd = match opt_str(args, "cwd") {
            Some(dir) => resolve_in_sandbox(&ctx.sandbox_dir, dir)?,
            None => ctx.working_dir.clone(),
        };

        let argv = crate::args::opt_str_list(args, "args");
        let timeout_ms = effective_timeout_ms(args, ctx.timeout_ms);

        let adapter = ShellAdapter::new();
        let result = adapter
            .run(
                command,
                &argv,
                &RunOptions {
                    cwd: Some(cwd),
                    timeout: Duration::from_millis(timeout_ms),
                    ..RunOptions::default()
                },
            )
            .await;

        Ok(run_result_data(command, result, timeout_ms))
    }
}

// ---------------------------------------------------------------------------
// run_script
// ---------------------------------------------------------------------------

struct RunScript;

#[async_trait::async_trait]
impl Tool for RunScript {
    fn name(&self) -> &str {
        "run_script"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }
    fn description(&self) -> &str {
        "Write a script to a temporary file and execute it with bash/sh/node/python3"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("content", ArgKind::Str),
            ArgSpec::optional("runtime", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let content = req_str(args, "content")?;
        let runtime = opt_str(args, "runtime").unwrap_or("bash");

        let suffix = SCRIPT_RUNTIMES
            .iter()
            .find(|(name, _)| *name == runtime)
            .map(|(_, suffix)| *suffix)
            .ok_or_else(|| {
                SmithError::BadArguments(format!(
                    "unsupported runtime {runtime:?}; expected bash, sh, node, or python3"
                ))
            })?;
        ensure_command_allowed(ctx, runtime)?;

        // NamedTempFile unlinks on drop, covering every exit path below.
        let script = tempfile::Builder::new()
            .prefix("smith-script-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| SmithError::ToolFailure(format!("cannot create script file: {e}")))?;
        std::fs::write(script.path(), content)
            .map_err(|e| SmithError::ToolFailure(format!("cannot write script file: {e}")))?;

        let timeout_ms = effective_timeout_ms(args, ctx.timeout_ms);
        let adapter = ShellAdapter::new();
        let result = adapter
            .run(
                runtime,
                &[script.path().display().to_string()],
                &RunOptions {
                    cwd: Some(ctx.working_dir.clone()),
                    timeout: Duration::from_millis(timeout_ms),
                    ..RunOptions::default()
                },
            )
            .await;

        Ok(run_result_data(runtime, result, timeout_ms))
    }
}

// ---------------------------------------------------------------------------
// which
// ---------------------------------------------------------------------------

struct Which;

#[async_trait::async_trait]
impl Tool for Which {
    fn name(&self) -> &str {
        "which"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Shell
    }
    fn description(&self) -> &str {
        "Locate a binary on the agent's PATH"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("binary", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let binary = req_str(args, "binary")?;
        let adapter = ShellAdapter::new();
        match adapter.which(binary).await {
            Some(path) => Ok(json!({ "found": true, "path": path })),
            None => Ok(json!({ "found": false, "path": Value::Null })),
        }
    }
}
