//! Git tool category.
//!
//! Every tool is a thin argv builder over the shell adapter. The `git`
//! binary itself must pass the allowlist; destructive subcommands are
//! additionally gated by read-only mode, and clone/worktree destinations
//! are sandbox-checked.

use std::time::Duration;

use serde_json::{json, Value};
use smith_shell::{RunOptions, ShellAdapter};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_str, opt_str_list, opt_u64, req_str, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::executor::effective_timeout_ms;
use crate::guard::{ensure_command_allowed, ensure_writable, resolve_in_sandbox, truncate_output};

/// All git tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(GitStatus),
        Box::new(GitDiff),
        Box::new(GitLog),
        Box::new(GitAdd),
        Box::new(GitCommit),
        Box::new(GitPush),
        Box::new(GitPull),
        Box::new(GitCheckout),
        Box::new(GitCreateBranch),
        Box::new(GitStash),
        Box::new(GitClone),
        Box::new(GitWorktreeAdd),
    ]
}

/// Run `git <argv>` in the sandbox working directory and shape the result.
///
/// A non-zero exit is reported as an embedded failure record carrying
/// stderr, so controllers see `success: false` with the git message.
async fn run_git(
    ctx: &ToolContext,
    args: &Value,
    argv: Vec<String>,
    destructive: Option<&str>,
) -> Result<Value, SmithError> {
    if let Some(operation) = destructive {
        ensure_writable(ctx, operation)?;
    }
    ensure_command_allowed(ctx, "git")?;

    let timeout_ms = effective_timeout_ms(args, ctx.timeout_ms);
    let adapter = ShellAdapter::new();
    let result = adapter
        .run(
            "git",
            &argv,
            &RunOptions {
                cwd: Some(ctx.working_dir.clone()),
                timeout: Duration::from_millis(timeout_ms),
                ..RunOptions::default()
            },
        )
        .await;

    if result.timed_out {
        return Ok(json!({
            "success": false,
            "error": format!("git {} timed out after {timeout_ms}ms", argv.first().map(String::as_str).unwrap_or("")),
            "timed_out": true,
        }));
    }
    if result.exit_code != 0 {
        let detail = if result.stderr.trim().is_empty() {
            result.stdout.trim().to_string()
        } else {
            result.stderr.trim().to_string()
        };
        return Ok(json!({
            "success": false,
            "error": format!(
                "git {} exited with code {}: {}",
                argv.first().map(String::as_str).unwrap_or(""),
                result.exit_code,
                truncate_output(&detail),
            ),
            "exit_code": result.exit_code,
        }));
    }

    Ok(json!({
        "exit_code": 0,
        "stdout": truncate_output(&result.stdout),
        "stderr": truncate_output(&result.stderr),
    }))
}

macro_rules! git_tool {
    ($ty:ident, $name:literal, $desc:literal, $specs:expr, $destructive:expr, $argv:expr) => {
        struct $ty;

        #[async_trait::async_trait]
        impl Tool for $ty {
            fn name(&self) -> &str {
                $name
            }
            fn category(&self) -> ToolCategory {
                ToolCategory::Git
            }
            fn description(&self) -> &str {
                $desc
            }
            fn arg_specs(&self) -> &'static [ArgSpec] {
                const SPECS: &[ArgSpec] = $specs;
                SPECS
            }
            async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
                #[allow(clippy::redundant_closure_call)]
                let argv: Result<Vec<String>, SmithError> = ($argv)(args, ctx);
                run_git(ctx, args, argv?, $destructive).await
            }
        }
    };
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

git_tool!(
    GitStatus,
    "git_status",
    "Show working tree status",
    &[],
    None,
    |_args: &Value, _ctx: &ToolContext| Ok(strings(&["status", "--short", "--branch"]))
);

git_tool!(
    GitDiff,
    "git_diff",
    "Show changes, optionally staged or limited to a path",
    &[
        ArgSpec::optional("path", ArgKind::Str),
        ArgSpec::optional("staged", ArgKind::Bool),
    ],
    None,
    |args: &Value, ctx: &ToolContext| {
        let mut argv = strings(&["diff"]);
        if crate::args::opt_bool(args, "staged", false) {
            argv.push("--cached".into());
        }
        if let Some(path) = opt_str(args, "path") {
            resolve_in_sandbox(&ctx.sandbox_dir, path)?;
            argv.push("--".into());
            argv.push(path.to_string());
        }
        Ok(argv)
    }
);

git_tool!(
    GitLog,
    "git_log",
    "Show recent commits, one line each",
    &[ArgSpec::optional("limit", ArgKind::Int)],
    None,
    |args: &Value, _ctx: &ToolContext| {
        let limit = opt_u64(args, "limit").unwrap_or(20);
        Ok(vec![
            "log".into(),
            "--oneline".into(),
            "--decorate".into(),
            "-n".into(),
            limit.to_string(),
        ])
    }
);

git_tool!(
    GitAdd,
    "git_add",
    "Stage paths for commit",
    &[ArgSpec::optional("paths", ArgKind::List)],
    None,
    |args: &Value, ctx: &ToolContext| {
        let paths = opt_str_list(args, "paths");
        let mut argv = strings(&["add", "--"]);
        if paths.is_empty() {
            argv.push(".".into());
        } else {
            for path in &paths {
                resolve_in_sandbox(&ctx.sandbox_dir, path)?;
                argv.push(path.clone());
            }
        }
        Ok(argv)
    }
);

git_tool!(
    GitCommit,
    "git_commit",
    "Record staged changes with a message",
    &[ArgSpec::required("message", ArgKind::Str)],
    Some("git_commit"),
    |args: &Value, _ctx: &ToolContext| {
        Ok(vec!["commit".into(), "-m".into(), req_str(args, "message")?.to_string()])
    }
);

git_tool!(
    GitPush,
    "git_push",
    "Push the current or named branch to a remote",
    &[
        ArgSpec::optional("remote", ArgKind::Str),
        ArgSpec::optional("branch", ArgKind::Str),
    ],
    Some("git_push"),
    |args: &Value, _ctx: &ToolContext| {
        let mut argv = strings(&["push"]);
        if let Some(remote) = opt_str(args, "remote") {
            argv.push(remote.to_string());
            if let Some(branch) = opt_str(args, "branch") {
                argv.push(branch.to_string());
            }
        }
        Ok(argv)
    }
);

git_tool!(
    GitPull,
    "git_pull",
    "Fetch and integrate from a remote",
    &[
        ArgSpec::optional("remote", ArgKind::Str),
        ArgSpec::optional("branch", ArgKind::Str),
    ],
    Some("git_pull"),
    |args: &Value, _ctx: &ToolContext| {
        let mut argv = strings(&["pull"]);
        if let Some(remote) = opt_str(args, "remote") {
            argv.push(remote.to_string());
            if let Some(branch) = opt_str(args, "branch") {
                argv.push(branch.to_string());
            }
        }
        Ok(argv)
    }
);

git_tool!(
    GitCheckout,
    "git_checkout",
    "Switch branches or restore a ref",
    &[
        ArgSpec::required("ref", ArgKind::Str),
        ArgSpec::optional("create", ArgKind::Bool),
    ],
    Some("git_checkout"),
    |args: &Value, _ctx: &ToolContext| {
        let mut argv = strings(&["checkout"]);
        if crate::args::opt_bool(args, "create", false) {
            argv.push("-b".into());
        }
        argv.push(req_str(args, "ref")?.to_string());
        Ok(argv)
    }
);

git_tool!(
    GitCreateBranch,
    "git_create_branch",
    "Create a branch without switching to it",
    &[ArgSpec::required("name", ArgKind::Str)],
    None,
    |args: &Value, _ctx: &ToolContext| {
        Ok(vec!["branch".into(), req_str(args, "name")?.to_string()])
    }
);

git_tool!(
    GitStash,
    "git_stash",
    "Stash or restore working tree changes",
    &[ArgSpec::optional("action", ArgKind::Str)],
    Some("git_stash"),
    |args: &Value, _ctx: &ToolContext| {
        let action = opt_str(args, "action").unwrap_or("push");
        match action {
            "push" | "pop" | "apply" | "drop" | "list" => {}
            other => {
                return Err(SmithError::BadArguments(format!(
                    "unsupported stash action {other:?}"
                )))
            }
        }
        Ok(vec!["stash".into(), action.to_string()])
    }
);

git_tool!(
    GitClone,
    "git_clone",
    "Clone a repository into the sandbox",
    &[
        ArgSpec::required("url", ArgKind::Str),
        ArgSpec::optional("destination", ArgKind::Str),
    ],
    Some("git_clone"),
    |args: &Value, ctx: &ToolContext| {
        let url = req_str(args, "url")?;
        let mut argv = vec!["clone".to_string(), url.to_string()];
        if let Some(destination) = opt_str(args, "destination") {
            let resolved = resolve_in_sandbox(&ctx.sandbox_dir, destination)?;
            argv.push(resolved.display().to_string());
        }
        Ok(argv)
    }
);

git_tool!(
    GitWorktreeAdd,
    "git_worktree_add",
    "Add a worktree at a sandboxed path",
    &[
        ArgSpec::required("path", ArgKind::Str),
        ArgSpec::optional("ref", ArgKind::Str),
    ],
    Some("git_worktree_add"),
    |args: &Value, ctx: &ToolContext| {
        let resolved = resolve_in_sandbox(&ctx.sandbox_dir, req_str(args, "path")?)?;
        let mut argv = vec!["worktree".to_string(), "add".to_string(), resolved.display().to_string()];
        if let Some(r) = opt_str(args, "ref") {
            argv.push(r.to_string());
        }
        Ok(argv)
    }
);
