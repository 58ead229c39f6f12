//! Security guards applied uniformly across tools: sandbox confinement,
//! command allowlisting, read-only gating, and output truncation.
//!
//! Path checks are consolidated here so individual tools cannot drift: a
//! tool resolves every path argument through [`guarded_path`] and never
//! touches the filesystem outside what it returns.

use std::path::{Component, Path, PathBuf};

use smith_types::{SmithError, ToolContext};

/// Byte cap applied to every tool output string.
pub const OUTPUT_CAP_BYTES: usize = 50 * 1024;

/// Executable extensions stripped during command normalization.
const EXECUTABLE_EXTENSIONS: &[&str] = &[".exe", ".cmd", ".bat", ".sh", ".ps1"];

// ---------------------------------------------------------------------------
// Path confinement
// ---------------------------------------------------------------------------

/// Lexically clean a path: drop `.` components and resolve `..` against
/// the components seen so far.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve to canonical absolute form as far as the filesystem allows.
///
/// Existing paths canonicalize fully (symlinks resolved). For a path that
/// does not exist yet (e.g. a write destination), the deepest existing
/// ancestor is canonicalized and the remaining lexically-cleaned components
/// are re-appended.
pub fn canonicalize_best_effort(path: &Path) -> PathBuf {
    let cleaned = lexical_clean(path);
    if let Ok(canonical) = cleaned.canonicalize() {
        return canonical;
    }

    let mut existing = cleaned.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut base = existing.canonicalize().unwrap_or(existing);
    for component in tail.iter().rev() {
        base.push(component);
    }
    base
}

/// True iff `path` equals `root` or sits strictly below it, after both are
/// resolved to canonical absolute form.
pub fn is_within_dir(path: &Path, root: &Path) -> bool {
    let path = canonicalize_best_effort(path);
    let root = canonicalize_best_effort(root);
    path == root || path.starts_with(&root)
}

/// Resolve a path argument against the sandbox root and confine it.
///
/// Relative arguments are joined onto the sandbox root; absolute arguments
/// are kept absolute. Either way the resolved target must lie within the
/// sandbox or the call fails with `SandboxViolation`.
pub fn resolve_in_sandbox(sandbox_dir: &Path, arg: &str) -> Result<PathBuf, SmithError> {
    let candidate = if Path::new(arg).is_absolute() {
        PathBuf::from(arg)
    } else {
        sandbox_dir.join(arg)
    };
    let resolved = canonicalize_best_effort(&candidate);
    if is_within_dir(&resolved, sandbox_dir) {
        Ok(resolved)
    } else {
        Err(SmithError::SandboxViolation(arg.to_string()))
    }
}

/// Fail with `ReadOnlyDenied` when the context is read-only.
pub fn ensure_writable(ctx: &ToolContext, operation: &str) -> Result<(), SmithError> {
    if ctx.readonly_mode {
        return Err(SmithError::ReadOnlyDenied(operation.to_string()));
    }
    Ok(())
}

/// The uniform per-path gate: read-only check (for destructive operations)
/// followed by sandbox resolution.
pub fn guarded_path(
    ctx: &ToolContext,
    arg: &str,
    destructive: Option<&str>,
) -> Result<PathBuf, SmithError> {
    if let Some(operation) = destructive {
        ensure_writable(ctx, operation)?;
    }
    resolve_in_sandbox(&ctx.sandbox_dir, arg)
}

// ---------------------------------------------------------------------------
// Command allowlisting
// ---------------------------------------------------------------------------

/// Normalize a binary reference for allowlist comparison: strip any
/// directory part, strip known executable extensions case-insensitively,
/// and lowercase.
fn normalize_binary(token: &str) -> String {
    let base = Path::new(token)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = base.to_lowercase();
    for ext in EXECUTABLE_EXTENSIONS {
        if let Some(stripped) = lower.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    lower
}

/// Check a command against the allowlist. Empty allowlist = unrestricted.
/// Only the base-name of the first token matters.
pub fn is_command_allowed(cmd: &str, allow: &[String]) -> bool {
    if allow.is_empty() {
        return true;
    }
    let first = match cmd.split_whitespace().next() {
        Some(token) => token,
        None => return false,
    };
    let normalized = normalize_binary(first);
    allow.iter().any(|a| normalize_binary(a) == normalized)
}

/// Allowlist gate returning the protocol error on refusal.
pub fn ensure_command_allowed(ctx: &ToolContext, cmd: &str) -> Result<(), SmithError> {
    if is_command_allowed(cmd, &ctx.allowed_commands) {
        Ok(())
    } else {
        Err(SmithError::NotAllowed(cmd.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Output truncation
// ---------------------------------------------------------------------------

/// Truncate a string to the default output cap.
pub fn truncate_output(s: &str) -> String {
    truncate_output_with_cap(s, OUTPUT_CAP_BYTES)
}

/// Truncate to `cap` bytes on a UTF-8 boundary and append a marker naming
/// the original byte count. Strings at or under the cap pass unchanged.
pub fn truncate_output_with_cap(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n[output truncated: {} bytes total]",
        &s[..end],
        s.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use smith_types::AgentConfig;

    fn ctx(sandbox: &Path, readonly: bool) -> ToolContext {
        let mut config = AgentConfig::default_for("guard", sandbox.to_path_buf());
        config.readonly_mode = readonly;
        ToolContext::from_config(&config)
    }

    // ---- sandbox confinement ----

    #[test]
    fn sandbox_root_itself_is_permitted() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(is_within_dir(tmp.path(), tmp.path()));
    }

    #[test]
    fn child_paths_are_permitted() {
        let tmp = tempfile::tempdir().unwrap();
        let child = tmp.path().join("a/b/c.txt");
        assert!(is_within_dir(&child, tmp.path()));
    }

    #[test]
    fn parent_escape_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let escape = tmp.path().join("../outside");
        assert!(!is_within_dir(&escape, tmp.path()));

        let sneaky = tmp.path().join("a/../../outside");
        assert!(!is_within_dir(&sneaky, tmp.path()));
    }

    #[test]
    fn sibling_prefix_is_rejected() {
        // "/w-extra" must not pass a check against root "/w".
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("w");
        let sibling = tmp.path().join("w-extra/file");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(sibling.parent().unwrap()).unwrap();
        assert!(!is_within_dir(&sibling, &root));
    }

    #[test]
    fn symlink_escape_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("root");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert!(!is_within_dir(&root.join("link"), &root));
        assert!(!is_within_dir(&root.join("link/file.txt"), &root));
    }

    #[test]
    fn resolve_joins_relative_and_keeps_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();

        let rel = resolve_in_sandbox(&root, "sub/file.txt").unwrap();
        assert_eq!(rel, root.join("sub/file.txt"));

        let abs_arg = root.join("direct.txt");
        let abs = resolve_in_sandbox(&root, abs_arg.to_str().unwrap()).unwrap();
        assert_eq!(abs, abs_arg);

        let err = resolve_in_sandbox(&root, "/etc/passwd").unwrap_err();
        assert!(err.to_string().contains("outside the sandbox"));

        let err = resolve_in_sandbox(&root, "../x").unwrap_err();
        assert!(err.to_string().contains("outside the sandbox"));
    }

    #[test]
    fn guarded_path_orders_readonly_before_sandbox() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ctx(tmp.path(), true);

        // Destructive op under read-only fails even for in-sandbox paths.
        let err = guarded_path(&ctx, "file.txt", Some("write_file")).unwrap_err();
        assert!(err.to_string().contains("read-only"));

        // Reads still work and are still confined.
        assert!(guarded_path(&ctx, "file.txt", None).is_ok());
        assert!(guarded_path(&ctx, "/etc/passwd", None).is_err());
    }

    // ---- allowlist ----

    fn allow(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_allowlist_is_unrestricted() {
        assert!(is_command_allowed("anything", &[]));
        assert!(is_command_allowed("/usr/bin/rm", &[]));
    }

    #[test]
    fn allowlist_matches_basename() {
        let list = allow(&["git", "ls"]);
        assert!(is_command_allowed("git", &list));
        assert!(is_command_allowed("/usr/bin/git", &list));
        assert!(is_command_allowed("git status", &list));
        assert!(!is_command_allowed("rm", &list));
        assert!(!is_command_allowed("/bin/rm -rf /", &list));
    }

    #[test]
    fn allowlist_strips_extensions_case_insensitively() {
        let list = allow(&["git"]);
        assert!(is_command_allowed("GIT.EXE", &list));
        assert!(is_command_allowed("git.cmd", &list));
        assert!(is_command_allowed("Git.BAT", &list));

        // And the allowlist side is normalized the same way.
        let list = allow(&["Deploy.PS1"]);
        assert!(is_command_allowed("deploy", &list));
        assert!(is_command_allowed("deploy.sh", &list));
    }

    #[test]
    fn allowlist_rejects_empty_command() {
        assert!(!is_command_allowed("", &allow(&["git"])));
        assert!(!is_command_allowed("   ", &allow(&["git"])));
    }

    // ---- truncation ----

    #[test]
    fn output_at_cap_is_unchanged() {
        let s = "x".repeat(OUTPUT_CAP_BYTES);
        assert_eq!(truncate_output(&s), s);
    }

    #[test]
    fn output_over_cap_is_truncated_with_marker() {
        let s = "x".repeat(OUTPUT_CAP_BYTES + 1);
        let out = truncate_output(&s);
        assert!(out.len() < s.len() + 64);
        assert!(out.contains(&format!("{} bytes total", OUTPUT_CAP_BYTES + 1)));
        assert!(out.starts_with(&"x".repeat(OUTPUT_CAP_BYTES)));
    }

    #[test]
    fn truncation_never_splits_multibyte() {
        // 'é' is two bytes; an odd cap lands mid-sequence.
        let s = "é".repeat(40);
        let out = truncate_output_with_cap(&s, 33);
        assert!(out.contains("80 bytes total"));
        // The kept prefix must still be valid UTF-8 of whole chars.
        let prefix = out.split('\n').next().unwrap();
        assert_eq!(prefix.len() % 2, 0);
        assert!(prefix.chars().all(|c| c == 'é'));
    }
}
