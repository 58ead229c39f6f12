//! Forceful process-tree termination with signal escalation.
//!
//! Walks the process tree from a root PID, terminates descendants from
//! leaves to root with SIGTERM, then escalates to SIGKILL for survivors
//! after a grace period. Refuses to target PID 0/1 and skips processes
//! owned by other users.

use std::time::Duration;

/// Grace period between SIGTERM and SIGKILL escalation used by the adapter.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Polling interval while waiting for processes to exit after SIGTERM.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Protected PIDs that must never be signalled.
fn is_protected(pid: i32) -> bool {
    pid <= 1
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use std::collections::HashMap;

    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use tracing::{debug, warn};

    struct ProcessInfo {
        pid: i32,
        ppid: i32,
        uid: u32,
    }

    /// Enumerate all processes by reading /proc.
    fn enumerate_processes() -> Vec<ProcessInfo> {
        let mut processes = Vec::new();
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return processes;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Ok(pid) = name.to_string_lossy().parse::<i32>() else {
                continue;
            };
            // The process may exit between readdir and this read.
            let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) else {
                continue;
            };
            let mut ppid = 0i32;
            let mut uid = u32::MAX;
            for line in status.lines() {
                if let Some(val) = line.strip_prefix("PPid:\t") {
                    ppid = val.trim().parse().unwrap_or(0);
                } else if let Some(val) = line.strip_prefix("Uid:\t") {
                    uid = val
                        .split_whitespace()
                        .next()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(u32::MAX);
                }
            }
            processes.push(ProcessInfo { pid, ppid, uid });
        }
        processes
    }

    /// Find descendants of `root`, deepest first (the right kill order).
    fn find_descendants(root: i32, processes: &[ProcessInfo]) -> Vec<i32> {
        let mut children_map: HashMap<i32, Vec<i32>> = HashMap::new();
        for p in processes {
            children_map.entry(p.ppid).or_default().push(p.pid);
        }
        let mut descendants = Vec::new();
        let mut queue = std::collections::VecDeque::from([root]);
        while let Some(pid) = queue.pop_front() {
            if let Some(children) = children_map.get(&pid) {
                for &child in children {
                    if child == root {
                        continue;
                    }
                    descendants.push(child);
                    queue.push_back(child);
                }
            }
        }
        descendants.reverse();
        descendants
    }

    fn send_signal(pid: i32, sig: Signal) {
        match signal::kill(Pid::from_raw(pid), sig) {
            Ok(()) => debug!(pid, signal = ?sig, "signal sent"),
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(pid, signal = ?sig, error = %e, "failed to signal process"),
        }
    }

    fn is_alive(pid: i32) -> bool {
        signal::kill(Pid::from_raw(pid), None).is_ok()
    }

    fn current_uid() -> u32 {
        // Safety: getuid() cannot fail.
        unsafe { libc::getuid() }
    }

    pub fn kill_tree(root: u32, grace: Duration) {
        let root = root as i32;
        if is_protected(root) {
            warn!(pid = root, "refusing to kill protected PID");
            return;
        }

        let processes = enumerate_processes();
        let my_uid = current_uid();

        let mut kill_list: Vec<i32> = find_descendants(root, &processes)
            .into_iter()
            .filter(|&pid| {
                if is_protected(pid) {
                    return false;
                }
                let owned = processes
                    .iter()
                    .find(|p| p.pid == pid)
                    .is_some_and(|p| p.uid == my_uid);
                if !owned {
                    warn!(pid, "skipping process not owned by current user");
                }
                owned
            })
            .collect();
        kill_list.push(root);

        debug!(root, count = kill_list.len(), "terminating process tree");

        for &pid in &kill_list {
            send_signal(pid, Signal::SIGTERM);
        }

        let deadline = std::time::Instant::now() + grace;
        loop {
            let survivors: Vec<i32> = kill_list.iter().copied().filter(|&p| is_alive(p)).collect();
            if survivors.is_empty() {
                return;
            }
            if std::time::Instant::now() >= deadline {
                warn!(
                    root,
                    survivors = survivors.len(),
                    "grace period expired, escalating to SIGKILL"
                );
                for &pid in &survivors {
                    send_signal(pid, Signal::SIGKILL);
                }
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
mod imp {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use tracing::warn;

    /// Without /proc there is no cheap tree walk; signal the root and rely
    /// on the grace/escalation contract.
    pub fn kill_tree(root: u32, grace: Duration) {
        let root = root as i32;
        if is_protected(root) {
            warn!(pid = root, "refusing to kill protected PID");
            return;
        }
        let _ = signal::kill(Pid::from_raw(root), Signal::SIGTERM);
        let deadline = std::time::Instant::now() + grace;
        while std::time::Instant::now() < deadline {
            if signal::kill(Pid::from_raw(root), None).is_err() {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        let _ = signal::kill(Pid::from_raw(root), Signal::SIGKILL);
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use tracing::warn;

    /// `taskkill /T /F` terminates the whole tree in one shot.
    pub fn kill_tree(root: u32, _grace: Duration) {
        if is_protected(root as i32) {
            return;
        }
        let result = std::process::Command::new("taskkill")
            .args(["/PID", &root.to_string(), "/T", "/F"])
            .output();
        if let Err(e) = result {
            warn!(pid = root, error = %e, "taskkill failed");
        }
    }
}

/// Terminate the process tree rooted at `root`.
///
/// Best-effort: already-exited processes and permission failures are logged
/// and skipped, never propagated.
pub fn kill_tree(root: u32, grace: Duration) {
    imp::kill_tree(root, grace);
}
