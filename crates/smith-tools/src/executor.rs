//! Tool executor: lookup, argument validation, timeout enforcement, and
//! result-envelope normalization.
//!
//! The executor does not gate concurrency; the protocol server owns the
//! in-flight cap. Every outcome, success or failure, is normalized into a
//! [`ToolResult`] envelope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smith_types::{SmithError, ToolContext, ToolResult};

use crate::args::{opt_u64, validate_args};
use crate::catalog::{ToolCatalog, ToolSet};

/// Extra headroom over the effective timeout before the executor's
/// backstop fires. Cooperative handlers (shell, network) enforce the
/// effective timeout themselves and use this window to report structured
/// timeout detail; the backstop catches everything else.
const TIMEOUT_BACKSTOP_SLACK_MS: u64 = 250;

/// Executes tools from an enabled set under a shared context.
pub struct Executor {
    set: ToolSet,
    ctx: Arc<ToolContext>,
}

impl Executor {
    /// Build the enabled tool set for `ctx` and wrap it in an executor.
    pub fn new(catalog: &ToolCatalog, ctx: ToolContext) -> Result<Self, SmithError> {
        let set = catalog.build(&ctx)?;
        Ok(Self {
            set,
            ctx: Arc::new(ctx),
        })
    }

    /// The capability list advertised on `register`.
    pub fn capabilities(&self) -> Vec<String> {
        self.set.capabilities()
    }

    /// The shared context (read-only).
    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Execute `tool_name` with `args` and normalize the outcome.
    ///
    /// 1. Unknown tool → failed envelope.
    /// 2. Argument validation against the tool's descriptors.
    /// 3. Handler invocation under the effective timeout
    ///    (`min(args.timeout_ms, base)` where `base` is the tool's own
    ///    default or the context default).
    /// 4. Envelope normalization: handler errors and handler-reported
    ///    `success: false` records both surface as failures.
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> ToolResult {
        let Some(tool) = self.set.get(tool_name) else {
            return ToolResult::fail(
                SmithError::UnknownTool(tool_name.to_string()).to_string(),
                0,
            );
        };

        let start = Instant::now();

        if let Err(e) = validate_args(tool.arg_specs(), &args) {
            return ToolResult::fail(e.to_string(), elapsed_ms(start));
        }

        let base = tool.default_timeout_ms().unwrap_or(self.ctx.timeout_ms);
        let effective = match opt_u64(&args, "timeout_ms") {
            Some(requested) => requested.min(base),
            None => base,
        };
        let backstop = Duration::from_millis(effective + TIMEOUT_BACKSTOP_SLACK_MS);

        let outcome = tokio::time::timeout(backstop, tool.execute(&args, &self.ctx)).await;
        let duration_ms = elapsed_ms(start);

        match outcome {
            Ok(Ok(data)) => {
                // A handler may return a record that is itself a failure
                // report; surface its error field instead of wrapping it
                // as a success.
                if data.get("success").and_then(|v| v.as_bool()) == Some(false) {
                    let error = data
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("tool reported failure")
                        .to_string();
                    return ToolResult {
                        success: false,
                        data,
                        error: Some(error),
                        duration_ms,
                    };
                }
                ToolResult::ok(data, duration_ms)
            }
            Ok(Err(e)) => {
                if matches!(e, SmithError::Internal(_)) {
                    tracing::error!(tool = tool_name, error = %e, "tool failed unexpectedly");
                }
                ToolResult::fail(e.to_string(), duration_ms)
            }
            // The backstop fired: report the nominal timeout, per contract.
            Err(_elapsed) => ToolResult::fail(
                SmithError::Timeout(effective).to_string(),
                effective,
            ),
        }
    }
}

/// Effective timeout for handlers that enforce it themselves on inner
/// awaits (subprocesses, network requests).
pub fn effective_timeout_ms(args: &serde_json::Value, base_ms: u64) -> u64 {
    match opt_u64(args, "timeout_ms") {
        Some(requested) => requested.min(base_ms),
        None => base_ms,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ArgKind, ArgSpec};
    use crate::definition::Tool;
    use smith_types::{AgentConfig, ToolCategory};
    use std::path::PathBuf;

    struct MockTool {
        name: String,
        delay: Option<Duration>,
        response: serde_json::Value,
        fail_with: Option<String>,
    }

    impl MockTool {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                delay: None,
                response: serde_json::json!({"status": "ok"}),
                fail_with: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn with_response(mut self, response: serde_json::Value) -> Self {
            self.response = response;
            self
        }

        fn failing(mut self, message: &str) -> Self {
            self.fail_with = Some(message.to_string());
            self
        }
    }

    #[async_trait::async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::System
        }
        fn description(&self) -> &str {
            "mock tool"
        }
        fn arg_specs(&self) -> &'static [ArgSpec] {
            const SPECS: &[ArgSpec] = &[ArgSpec::optional("path", ArgKind::Str)];
            SPECS
        }
        async fn execute(
            &self,
            _args: &serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, SmithError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = &self.fail_with {
                return Err(SmithError::ToolFailure(message.clone()));
            }
            Ok(self.response.clone())
        }
    }

    fn executor_with(tools: Vec<MockTool>, timeout_ms: u64) -> Executor {
        let mut config = AgentConfig::default_for("exec", PathBuf::from("/tmp/sandbox"));
        config.timeout_ms = timeout_ms;
        let ctx = ToolContext::from_config(&config);

        let mut catalog = ToolCatalog::new();
        let shared: Arc<std::sync::Mutex<Vec<MockTool>>> = Arc::new(std::sync::Mutex::new(tools));
        catalog.register(ToolCategory::System, move || {
            shared
                .lock()
                .unwrap()
                .drain(..)
                .map(|t| Box::new(t) as Box<dyn Tool>)
                .collect()
        });
        Executor::new(&catalog, ctx).unwrap()
    }

    #[tokio::test]
    async fn successful_call_wraps_data() {
        let executor = executor_with(
            vec![MockTool::new("mock_ok").with_response(serde_json::json!({"answer": 42}))],
            5_000,
        );
        let result = executor.execute("mock_ok", serde_json::json!({})).await;
        assert!(result.success, "expected success, got {result:?}");
        assert_eq!(result.data["answer"], 42);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast() {
        let executor = executor_with(vec![], 5_000);
        let result = executor.execute("nope", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unknown tool"));
        assert_eq!(result.duration_ms, 0);
    }

    #[tokio::test]
    async fn bad_arguments_rejected_before_handler() {
        let executor = executor_with(vec![MockTool::new("mock_args")], 5_000);
        let result = executor
            .execute("mock_args", serde_json::json!({"path": 7}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn handler_error_becomes_failed_envelope() {
        let executor = executor_with(vec![MockTool::new("mock_fail").failing("disk on fire")], 5_000);
        let result = executor.execute("mock_fail", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("disk on fire"));
    }

    #[tokio::test]
    async fn embedded_failure_record_is_surfaced() {
        let executor = executor_with(
            vec![MockTool::new("mock_soft").with_response(serde_json::json!({
                "success": false,
                "error": "command timed out after 200ms",
                "timed_out": true,
            }))],
            5_000,
        );
        let result = executor.execute("mock_soft", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        // The structured detail stays available in data.
        assert_eq!(result.data["timed_out"], true);
    }

    #[tokio::test]
    async fn backstop_timeout_reports_nominal_duration() {
        let executor = executor_with(
            vec![MockTool::new("mock_slow").with_delay(Duration::from_secs(10))],
            100,
        );
        let result = executor.execute("mock_slow", serde_json::json!({})).await;
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("timed out"));
        assert_eq!(result.duration_ms, 100, "duration must equal the timeout");
    }

    #[tokio::test]
    async fn arg_timeout_is_minned_with_context() {
        let executor = executor_with(
            vec![MockTool::new("mock_min").with_delay(Duration::from_secs(10))],
            100,
        );
        // A huge requested timeout cannot exceed the context cap.
        let result = executor
            .execute("mock_min", serde_json::json!({"timeout_ms": 60_000}))
            .await;
        assert!(!result.success);
        assert_eq!(result.duration_ms, 100);
    }

    #[test]
    fn effective_timeout_helper() {
        assert_eq!(effective_timeout_ms(&serde_json::json!({}), 1_000), 1_000);
        assert_eq!(
            effective_timeout_ms(&serde_json::json!({"timeout_ms": 200}), 1_000),
            200
        );
        assert_eq!(
            effective_timeout_ms(&serde_json::json!({"timeout_ms": 9_000}), 1_000),
            1_000
        );
    }
}
