//! The OS-abstracting subprocess adapter.
//!
//! [`ShellAdapter`] is the single path every shell-backed tool goes
//! through: it spawns the process with the caller's working directory and
//! a sanitized environment, enforces a hard wall-clock timeout, and
//! captures stdout/stderr as UTF-8.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::env::sanitize_env;
use crate::kill_tree::{kill_tree, DEFAULT_GRACE};

/// Platform tag the adapter dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Detect the platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Options for a single [`ShellAdapter::run`] call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Hard wall-clock limit.
    pub timeout: Duration,
    /// Extra variables merged over the sanitized inherited environment.
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin before it is closed.
    pub stdin: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(30),
            env: Vec::new(),
            stdin: None,
        }
    }
}

/// Outcome of a subprocess run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl RunResult {
    fn spawn_failure(message: String) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: message,
            timed_out: false,
        }
    }
}

/// OS-specific process spawner with a uniform interface.
#[derive(Debug, Clone, Copy)]
pub struct ShellAdapter {
    platform: Platform,
}

impl Default for ShellAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellAdapter {
    /// Adapter for the current platform.
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
        }
    }

    /// Adapter with an explicit platform tag (for tests).
    pub fn with_platform(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Run a subprocess and capture its output.
    ///
    /// POSIX platforms pass argv directly (no intermediate shell); Windows
    /// goes through the system command processor with the window hidden.
    /// On timeout the whole process tree is terminated and
    /// `timed_out = true` is returned. A spawn failure yields exit code 1
    /// with the error message appended to stderr.
    pub async fn run(&self, cmd: &str, args: &[String], opts: &RunOptions) -> RunResult {
        let mut command = self.build_command(cmd, args);
        if opts.stdin.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }

        let inherited: Vec<(String, String)> = std::env::vars().collect();
        command.env_clear();
        command.envs(sanitize_env(&inherited, &[]));
        command.envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(cmd, error = %e, "failed to spawn subprocess");
                return RunResult::spawn_failure(format!("failed to spawn {cmd}: {e}"));
            }
        };
        let pid = child.id();

        if let Some(input) = &opts.stdin {
            if let Some(mut stdin_pipe) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                let bytes = input.clone().into_bytes();
                tokio::spawn(async move {
                    let _ = stdin_pipe.write_all(&bytes).await;
                    // Dropping the handle closes the pipe.
                });
            }
        }

        // Drain both pipes concurrently so a full pipe buffer cannot
        // deadlock the child.
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        let (status, timed_out) = match tokio::time::timeout(opts.timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(status), false),
            Ok(Err(e)) => {
                warn!(cmd, error = %e, "failed waiting for subprocess");
                (None, false)
            }
            Err(_) => {
                debug!(cmd, pid, timeout_ms = opts.timeout.as_millis() as u64, "subprocess timed out");
                if let Some(pid) = pid {
                    // kill_tree polls synchronously; keep it off the
                    // async worker threads.
                    let _ = tokio::task::spawn_blocking(move || kill_tree(pid, DEFAULT_GRACE)).await;
                }
                // Reap the child so the pipes close and readers finish.
                let status = child.wait().await.ok();
                (status, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let exit_code = match status {
            Some(s) => s.code().unwrap_or(-1),
            None => 1,
        };

        RunResult {
            exit_code,
            stdout,
            stderr,
            timed_out,
        }
    }

    /// Locate a binary via the platform lookup. Returns the first match
    /// line, trimmed, or `None` when the binary is not found.
    pub async fn which(&self, bin: &str) -> Option<String> {
        let lookup = if self.platform.is_windows() {
            "where"
        } else {
            "which"
        };
        let result = self
            .run(
                lookup,
                &[bin.to_string()],
                &RunOptions {
                    timeout: Duration::from_secs(5),
                    ..RunOptions::default()
                },
            )
            .await;
        if result.exit_code != 0 {
            return None;
        }
        let first = result.stdout.lines().next()?.trim();
        if first.is_empty() {
            None
        } else {
            Some(first.to_string())
        }
    }

    fn build_command(&self, cmd: &str, args: &[String]) -> tokio::process::Command {
        if self.platform.is_windows() {
            // Windows goes through the command processor; join argv with
            // conservative quoting and hide the console window.
            let mut line = quote_windows(cmd);
            for arg in args {
                line.push(' ');
                line.push_str(&quote_windows(arg));
            }
            let mut command = tokio::process::Command::new("cmd");
            command.arg("/C").arg(line);
            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                const CREATE_NO_WINDOW: u32 = 0x0800_0000;
                command.creation_flags(CREATE_NO_WINDOW);
            }
            command
        } else {
            let mut command = tokio::process::Command::new(cmd);
            command.args(args);
            command
        }
    }
}

fn quote_windows(s: &str) -> String {
    if s.is_empty() || s.contains([' ', '\t', '"']) {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

/// Read a pipe to completion into a lossily-decoded string.
fn spawn_reader<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    })
}
