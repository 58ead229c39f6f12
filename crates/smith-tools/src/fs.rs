//! Filesystem tool category.
//!
//! Every path argument goes through [`guarded_path`]; destructive
//! operations name themselves so read-only refusals are self-describing.

use std::path::Path;

use serde_json::{json, Value};
use smith_types::{SmithError, ToolCategory, ToolContext};

use crate::args::{opt_bool, opt_str, opt_u64, req_str, ArgKind, ArgSpec};
use crate::definition::Tool;
use crate::guard::{guarded_path, truncate_output};

/// Default cap on grep results.
const GREP_MAX_RESULTS: usize = 100;

/// All filesystem tools, in advertised order.
pub fn tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ReadFile),
        Box::new(WriteFile),
        Box::new(AppendFile),
        Box::new(DeleteFile),
        Box::new(MoveFile),
        Box::new(CopyFile),
        Box::new(ListDir),
        Box::new(MakeDir),
        Box::new(StatFile),
        Box::new(GrepFiles),
        Box::new(FindFiles),
    ]
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

struct ReadFile;

#[async_trait::async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Read a file as UTF-8 text, optionally sliced to a 1-based line range"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("file_path", ArgKind::Str),
            ArgSpec::optional("start_line", ArgKind::Int),
            ArgSpec::optional("end_line", ArgKind::Int),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "file_path")?, None)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| SmithError::ToolFailure(format!("cannot read {}: {e}", path.display())))?;

        let sliced = match (opt_u64(args, "start_line"), opt_u64(args, "end_line")) {
            (None, None) => content,
            (start, end) => {
                let start = start.unwrap_or(1).max(1) as usize;
                let lines: Vec<&str> = content.lines().collect();
                let end = end.map(|e| e as usize).unwrap_or(lines.len()).min(lines.len());
                if start > end {
                    String::new()
                } else {
                    lines[start - 1..end].join("\n")
                }
            }
        };

        Ok(Value::String(truncate_output(&sliced)))
    }
}

// ---------------------------------------------------------------------------
// write_file / append_file
// ---------------------------------------------------------------------------

struct WriteFile;

#[async_trait::async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Write content to a file, creating parent directories if needed"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("file_path", ArgKind::Str),
            ArgSpec::required("content", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "file_path")?, Some("write_file"))?;
        let content = req_str(args, "content")?;
        create_parents(&path)?;
        std::fs::write(&path, content)
            .map_err(|e| SmithError::ToolFailure(format!("cannot write {}: {e}", path.display())))?;
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": content.len(),
        }))
    }
}

struct AppendFile;

#[async_trait::async_trait]
impl Tool for AppendFile {
    fn name(&self) -> &str {
        "append_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Append content to a file, creating it if missing"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("file_path", ArgKind::Str),
            ArgSpec::required("content", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        use std::io::Write;
        let path = guarded_path(ctx, req_str(args, "file_path")?, Some("append_file"))?;
        let content = req_str(args, "content")?;
        create_parents(&path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SmithError::ToolFailure(format!("cannot open {}: {e}", path.display())))?;
        file.write_all(content.as_bytes())
            .map_err(|e| SmithError::ToolFailure(format!("cannot append to {}: {e}", path.display())))?;
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_appended": content.len(),
        }))
    }
}

// ---------------------------------------------------------------------------
// delete_file / move_file / copy_file
// ---------------------------------------------------------------------------

struct DeleteFile;

#[async_trait::async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Delete a file, or a directory when recursive is set"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("file_path", ArgKind::Str),
            ArgSpec::optional("recursive", ArgKind::Bool),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "file_path")?, Some("delete_file"))?;
        if path.is_dir() {
            if !opt_bool(args, "recursive", false) {
                return Err(SmithError::ToolFailure(format!(
                    "{} is a directory; pass recursive=true to delete it",
                    path.display()
                )));
            }
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        }
        .map_err(|e| SmithError::ToolFailure(format!("cannot delete {}: {e}", path.display())))?;
        Ok(json!({ "deleted": path.display().to_string() }))
    }
}

struct MoveFile;

#[async_trait::async_trait]
impl Tool for MoveFile {
    fn name(&self) -> &str {
        "move_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Move or rename a file or directory inside the sandbox"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("source", ArgKind::Str),
            ArgSpec::required("destination", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let source = guarded_path(ctx, req_str(args, "source")?, Some("move_file"))?;
        let destination = guarded_path(ctx, req_str(args, "destination")?, Some("move_file"))?;
        create_parents(&destination)?;
        std::fs::rename(&source, &destination).map_err(|e| {
            SmithError::ToolFailure(format!(
                "cannot move {} to {}: {e}",
                source.display(),
                destination.display()
            ))
        })?;
        Ok(json!({
            "source": source.display().to_string(),
            "destination": destination.display().to_string(),
        }))
    }
}

struct CopyFile;

#[async_trait::async_trait]
impl Tool for CopyFile {
    fn name(&self) -> &str {
        "copy_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Copy a file inside the sandbox"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("source", ArgKind::Str),
            ArgSpec::required("destination", ArgKind::Str),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let source = guarded_path(ctx, req_str(args, "source")?, None)?;
        let destination = guarded_path(ctx, req_str(args, "destination")?, None)?;
        create_parents(&destination)?;
        let bytes = std::fs::copy(&source, &destination).map_err(|e| {
            SmithError::ToolFailure(format!(
                "cannot copy {} to {}: {e}",
                source.display(),
                destination.display()
            ))
        })?;
        Ok(json!({
            "source": source.display().to_string(),
            "destination": destination.display().to_string(),
            "bytes_copied": bytes,
        }))
    }
}

// ---------------------------------------------------------------------------
// list_dir / make_dir / stat_file
// ---------------------------------------------------------------------------

struct ListDir;

#[async_trait::async_trait]
impl Tool for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "List directory entries, optionally one level deeper"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::optional("path", ArgKind::Str),
            ArgSpec::optional("recursive", ArgKind::Bool),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, opt_str(args, "path").unwrap_or("."), None)?;
        let recursive = opt_bool(args, "recursive", false);

        let mut entries = Vec::new();
        list_into(&path, &path, &mut entries)?;
        if recursive {
            let subdirs: Vec<std::path::PathBuf> = entries
                .iter()
                .filter(|e| e["type"] == "dir")
                .map(|e| path.join(e["name"].as_str().unwrap_or_default()))
                .collect();
            for subdir in subdirs {
                list_into(&subdir, &path, &mut entries)?;
            }
        }

        Ok(json!({ "path": path.display().to_string(), "entries": entries }))
    }
}

fn list_into(
    dir: &Path,
    base: &Path,
    out: &mut Vec<Value>,
) -> Result<(), SmithError> {
    let iter = std::fs::read_dir(dir)
        .map_err(|e| SmithError::ToolFailure(format!("cannot list {}: {e}", dir.display())))?;
    let mut batch = Vec::new();
    for entry in iter.flatten() {
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let full = entry.path();
        let name = full.strip_prefix(base).unwrap_or(&full).display().to_string();
        batch.push(json!({
            "name": name,
            "type": if meta.is_dir() { "dir" } else { "file" },
            "size": meta.len(),
        }));
    }
    batch.sort_by(|a, b| {
        a["name"]
            .as_str()
            .unwrap_or_default()
            .cmp(b["name"].as_str().unwrap_or_default())
    });
    out.extend(batch);
    Ok(())
}

struct MakeDir;

#[async_trait::async_trait]
impl Tool for MakeDir {
    fn name(&self) -> &str {
        "make_dir"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Create a directory and any missing parents"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("path", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "path")?, Some("make_dir"))?;
        std::fs::create_dir_all(&path)
            .map_err(|e| SmithError::ToolFailure(format!("cannot create {}: {e}", path.display())))?;
        Ok(json!({ "created": path.display().to_string() }))
    }
}

struct StatFile;

#[async_trait::async_trait]
impl Tool for StatFile {
    fn name(&self) -> &str {
        "stat_file"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Report metadata for a path"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[ArgSpec::required("path", ArgKind::Str)];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let path = guarded_path(ctx, req_str(args, "path")?, None)?;
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(_) => {
                return Ok(json!({
                    "path": path.display().to_string(),
                    "exists": false,
                }))
            }
        };
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        Ok(json!({
            "path": path.display().to_string(),
            "exists": true,
            "type": if meta.is_dir() { "dir" } else { "file" },
            "size": meta.len(),
            "readonly": meta.permissions().readonly(),
            "modified": modified,
        }))
    }
}

// ---------------------------------------------------------------------------
// grep_files / find_files
// ---------------------------------------------------------------------------

struct GrepFiles;

#[async_trait::async_trait]
impl Tool for GrepFiles {
    fn name(&self) -> &str {
        "grep_files"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Search file contents with a regex, returning file/line/match records"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("pattern", ArgKind::Str),
            ArgSpec::optional("path", ArgKind::Str),
            ArgSpec::optional("max_results", ArgKind::Int),
            ArgSpec::optional("case_insensitive", ArgKind::Bool),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let root = guarded_path(ctx, opt_str(args, "path").unwrap_or("."), None)?;
        let max_results = opt_u64(args, "max_results").unwrap_or(GREP_MAX_RESULTS as u64) as usize;

        let pattern = req_str(args, "pattern")?;
        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(opt_bool(args, "case_insensitive", false))
            .build()
            .map_err(|e| SmithError::BadArguments(format!("invalid pattern: {e}")))?;

        let mut matches = Vec::new();
        let mut truncated = false;
        let mut stack = vec![root.clone()];
        'walk: while let Some(dir) = stack.pop() {
            let Ok(iter) = std::fs::read_dir(&dir) else { continue };
            let mut entries: Vec<_> = iter.flatten().map(|e| e.path()).collect();
            entries.sort();
            for path in entries {
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                // Binary and unreadable files are skipped, not errors.
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for (idx, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        if matches.len() >= max_results {
                            truncated = true;
                            break 'walk;
                        }
                        matches.push(json!({
                            "file": path.strip_prefix(&root).unwrap_or(&path).display().to_string(),
                            "line": idx + 1,
                            "match": truncate_output_line(line),
                        }));
                    }
                }
            }
        }

        Ok(json!({
            "matches": matches,
            "truncated": truncated,
        }))
    }
}

/// Cap a single matched line so one pathological file cannot blow the
/// result payload.
fn truncate_output_line(line: &str) -> String {
    const LINE_CAP: usize = 512;
    if line.len() <= LINE_CAP {
        return line.to_string();
    }
    let mut end = LINE_CAP;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &line[..end])
}

struct FindFiles;

#[async_trait::async_trait]
impl Tool for FindFiles {
    fn name(&self) -> &str {
        "find_files"
    }
    fn category(&self) -> ToolCategory {
        ToolCategory::Filesystem
    }
    fn description(&self) -> &str {
        "Find files whose name or relative path matches a glob pattern"
    }
    fn arg_specs(&self) -> &'static [ArgSpec] {
        const SPECS: &[ArgSpec] = &[
            ArgSpec::required("pattern", ArgKind::Str),
            ArgSpec::optional("path", ArgKind::Str),
            ArgSpec::optional("max_results", ArgKind::Int),
        ];
        SPECS
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<Value, SmithError> {
        let root = guarded_path(ctx, opt_str(args, "path").unwrap_or("."), None)?;
        let pattern = req_str(args, "pattern")?;
        let max_results = opt_u64(args, "max_results").unwrap_or(GREP_MAX_RESULTS as u64) as usize;

        let mut found = Vec::new();
        let mut stack = vec![root.clone()];
        'walk: while let Some(dir) = stack.pop() {
            let Ok(iter) = std::fs::read_dir(&dir) else { continue };
            let mut entries: Vec<_> = iter.flatten().map(|e| e.path()).collect();
            entries.sort();
            for path in entries {
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = path.strip_prefix(&root).unwrap_or(&path).display().to_string();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if smith_shell::env::glob_match(&name, pattern)
                    || smith_shell::env::glob_match(&rel, pattern)
                {
                    found.push(Value::String(rel));
                    if found.len() >= max_results {
                        break 'walk;
                    }
                }
            }
        }

        Ok(json!({ "files": found }))
    }
}

/// Create the parent directories of a target path.
fn create_parents(path: &Path) -> Result<(), SmithError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            SmithError::ToolFailure(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    Ok(())
}
