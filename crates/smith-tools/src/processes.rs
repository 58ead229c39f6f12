//! Processes tool category: enumeration, inspection, kill, system facts,
//! and filtered environment reads.

use serde_json::{json, Value};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_bool, opt_str, opt_u64, req_u64, ArgKind, ArgSpec};
use crate::definition::Tool;

/// Default cap on process_list results.
const LIST_LIMIT: usize = 50;

/// Substrings that mark an environment key as sensitive.
const SENSITIVE_KEY_MARKERS: &[&str] = &["key", "token", "secret", "password"];

/// All processes tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ProcessList),
        Box::new(ProcessGet),
        Box::new(ProcessKill),
        Box::new(SystemInfo),
        Box::new(EnvRead),
    ]
}

fn process_record(pid: &sysinfo::Pid, process: &sysinfo::Process) -> Value {
    json!({
        "pid": pid.as_u32(),
        "name": process.name().to_string_lossy(),
        "cpu_percent": process.cpu_usage(),
        "memory_mb": process.memory() / (1024 * 1024),
    })
}

// ---------------------------------------------------------------------------
// process_list / process_get / process_kill
// ---------------------------------------------------------------------------

struct ProcessList;

#[async_trait::async_trait]
impl Tool for ProcessList {
    fn name(&self) -> &str {
        "process_list"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Processes
    }
    fn description(&self) -> &str {
        "List running processes, optionally filtered by name substring"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::optional("filter", ArgKind::Str),
            ArgSpec::optional("limit", ArgKind::Int),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let filter = opt_str(args, "filter").map(str::to_lowercase);
        let limit = opt_u64(args, "limit").unwrap_or(LIST_LIMIT as u64) as usize;

        let sys = sysinfo::System::new_all();
        let mut records: Vec<(u32, Value)> = sys
            .processes()
            .iter()
            .filter(|(_, process)| match &filter {
                Some(needle) => process
                    .name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(needle),
                None => true,
            })
            .map(|(pid, process)| (pid.as_u32(), process_record(pid, process)))
            .collect();
        records.sort_by_key(|(pid, _)| *pid);
        records.truncate(limit);

        Ok(json!({
            "processes": records.into_iter().map(|(_, r)| r).collect::<Vec<_>>(),
        }))
    }
}

struct ProcessGet;

#[async_trait::async_trait]
impl Tool for ProcessGet {
    fn name(&self) -> &str {
        "process_get"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Processes
    }
    fn description(&self) -> &str {
        "Inspect one process by PID"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("pid", ArgKind::Int)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let pid = req_u64(args, "pid")? as u32;
        let sys = sysinfo::System::new_all();
        let sys_pid = sysinfo::Pid::from_u32(pid);
        let process = sys
            .process(sys_pid)
            .ok_or_else(|| SmithError::ToolFailure(format!("no such process: {pid}")))?;

        let cmd: Vec<String> = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        let mut record = process_record(&sys_pid, process);
        record["status"] = Value::String(process.status().to_string());
        record["cmd"] = json!(cmd);
        Ok(record)
    }
}

struct ProcessKill;

#[async_trait::async_trait]
impl Tool for ProcessKill {
    fn name(&self) -> &str {
        "process_kill"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Processes
    }
    fn description(&self) -> &str {
        "Terminate a process by PID"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("pid", ArgKind::Int)];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let pid = req_u64(args, "pid")? as u32;
        if pid <= 1 {
            return Err(SmithError::ToolFailure(format!(
                "refusing to kill protected PID {pid}"
            )));
        }
        if pid == std::process::id() {
            return Err(SmithError::ToolFailure(
                "refusing to kill the agent process itself".into(),
            ));
        }

        let sys = sysinfo::System::new_all();
        let process = sys
            .process(sysinfo::Pid::from_u32(pid))
            .ok_or_else(|| SmithError::ToolFailure(format!("no such process: {pid}")))?;

        let killed = process.kill();
        if !killed {
            return Err(SmithError::ToolFailure(format!(
                "failed to signal process {pid} (insufficient permissions?)"
            )));
        }
        Ok(json!({ "pid": pid, "killed": true }))
    }
}

// ---------------------------------------------------------------------------
// system_info
// ---------------------------------------------------------------------------

struct SystemInfo;

#[async_trait::async_trait]
impl Tool for SystemInfo {
    fn name(&self) -> &str {
        "system_info"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Processes
    }
    fn description(&self) -> &str {
        "Report OS, kernel, hostname, CPU count, memory, and uptime"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        &[]
    }

    async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let sys = sysinfo::System::new_all();
        Ok(json!({
            "os": sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            "kernel": sysinfo::System::kernel_version(),
            "hostname": sysinfo::System::host_name(),
            "arch": std::env::consts::ARCH,
            "cpus": sys.cpus().len(),
            "memory_total_mb": sys.total_memory() / (1024 * 1024),
            "memory_used_mb": sys.used_memory() / (1024 * 1024),
            "uptime_seconds": sysinfo::System::uptime(),
        }))
    }
}

// ---------------------------------------------------------------------------
// env_read
// ---------------------------------------------------------------------------

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

struct EnvRead;

#[async_trait::async_trait]
impl Tool for EnvRead {
    fn name(&self) -> &str {
        "env_read"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Processes
    }
    fn description(&self) -> &str {
        "Read environment variables, hiding credential-like keys unless all=true"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::optional("name", ArgKind::Str),
            ArgSpec::optional("all", ArgKind::Bool),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<Value, SmithError> {
        let include_sensitive = opt_bool(args, "all", false);

        if let Some(name) = opt_str(args, "name") {
            if is_sensitive_key(name) && !include_sensitive {
                return Err(SmithError::ToolFailure(format!(
                    "{name} looks like a credential; pass all=true to read it"
                )));
            }
            let value = std::env::var(name).ok();
            return Ok(json!({ "name": name, "value": value }));
        }

        let mut vars: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| include_sensitive || !is_sensitive_key(key))
            .collect();
        vars.sort();
        let map: serde_json::Map<String, Value> = vars
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        Ok(json!({ "env": map }))
    }
}
