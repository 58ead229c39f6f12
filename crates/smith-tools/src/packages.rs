//! Packages tool category: npm, pip, and cargo wrappers.
//!
//! All of these shell out through the adapter with allowlist enforcement
//! and a longer default timeout, since package operations routinely exceed
//! the general tool budget.

use std::time::Duration;

use serde_json::{json, Value};
use smith_shell::{RunOptions, ShellAdapter};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_bool, opt_str_list, req_str, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::executor::effective_timeout_ms;
use crate::guard::{ensure_command_allowed, truncate_output};

/// Package operations default to two minutes.
const PACKAGES_TIMEOUT_MS: u64 = 120_000;

/// All packages tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(NpmInstall),
        Box::new(NpmRun),
        Box::new(PipInstall),
        Box::new(CargoBuild),
    ]
}

/// Run a package-manager command in the sandbox working directory.
async fn run_package_command(
    ctx: &ToolContext,
    args: &Value,
    binary: &str,
    argv: Vec<String>,
) -> Result<Value, SmithError> {
    ensure_command_allowed(ctx, binary)?;

    let timeout_ms = effective_timeout_ms(args, PACKAGES_TIMEOUT_MS);
    let adapter = ShellAdapter::new();
    let result = adapter
        .run(
            binary,
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
            "error": format!("{binary} timed out after {timeout_ms}ms"),
            "timed_out": true,
        }));
    }
    if result.exit_code != 0 {
        return Ok(json!({
            "success": false,
            "error": format!(
                "{binary} exited with code {}: {}",
                result.exit_code,
                truncate_output(result.stderr.trim()),
            ),
            "exit_code": result.exit_code,
            "stdout": truncate_output(&result.stdout),
        }));
    }
    Ok(json!({
        "exit_code": 0,
        "stdout": truncate_output(&result.stdout),
        "stderr": truncate_output(&result.stderr),
    }))
}

struct NpmInstall;

#[async_trait::async_trait]
impl Tool for NpmInstall {
    fn name(&self) -> &str {
        "npm_install"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Packages
    }
    fn description(&self) -> &str {
        "Install npm packages (or the project's dependencies when none are named)"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::optional("packages", ArgKind::List),
            ArgSpec::optional("dev", ArgKind::Bool),
        ];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PACKAGES_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let mut argv = vec!["install".to_string()];
        if opt_bool(args, "dev", false) {
            argv.push("--save-dev".into());
        }
        argv.extend(opt_str_list(args, "packages"));
        run_package_command(ctx, args, "npm", argv).await
    }
}

struct NpmRun;

#[async_trait::async_trait]
impl Tool for NpmRun {
    fn name(&self) -> &str {
        "npm_run"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Packages
    }
    fn description(&self) -> &str {
        "Run an npm script from package.json"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("script", ArgKind::Str)];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PACKAGES_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let script = req_str(args, "script")?;
        run_package_command(ctx, args, "npm", vec!["run".into(), script.to_string()]).await
    }
}

struct PipInstall;

#[async_trait::async_trait]
impl Tool for PipInstall {
    fn name(&self) -> &str {
        "pip_install"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Packages
    }
    fn description(&self) -> &str {
        "Install python packages, or requirements.txt when none are named"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::optional("packages", ArgKind::List)];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PACKAGES_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let packages = opt_str_list(args, "packages");
        // Contract: install the listed packages, or install from
        // requirements.txt when the list is empty.
        let mut argv = vec!["install".to_string()];
        if packages.is_empty() {
            argv.push("-r".into());
            argv.push("requirements.txt".into());
        } else {
            argv.extend(packages);
        }
        run_package_command(ctx, args, "pip3", argv).await
    }
}

struct CargoBuild;

#[async_trait::async_trait]
impl Tool for CargoBuild {
    fn name(&self) -> &str {
        "cargo_build"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Packages
    }
    fn description(&self) -> &str {
        "Build the cargo project in the sandbox"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::optional("release", ArgKind::Bool)];
        SPECS
    }
    fn default_timeout_ms(&self) -> Option<u64> {
        Some(PACKAGES_TIMEOUT_MS)
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let mut argv = vec!["build".to_string()];
        if opt_bool(args, "release", false) {
            argv.push("--release".into());
        }
        run_package_command(ctx, args, "cargo", argv).await
    }
}
