//! PID-file persistence for single-instance enforcement.

use std::path::Path;

use smith_types::home;

/// Write the current process id to the PID file.
pub fn write_pid_file(home_dir: &Path) -> anyhow::Result<()> {
    let path = home::pid_path(home_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pid = std::process::id();
    std::fs::write(&path, pid.to_string())?;
    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Read the recorded PID, if any.
pub fn read_pid(home_dir: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(home::pid_path(home_dir)).ok()?;
    content.trim().parse().ok()
}

/// Remove the PID file. Missing files are not an error.
pub fn remove_pid_file(home_dir: &Path) {
    let path = home::pid_path(home_dir);
    if let Err(e) = std::fs::remove_file(&path) {
        tracing::debug!(error = %e, "PID file not removed (may not exist)");
    }
}

/// Check whether a process with the given PID is alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // A PID that would wrap negative must not probe process groups.
    let Ok(raw_pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 checks existence without delivering anything.
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw_pid), None).is_ok()
}

#[cfg(not(unix))]
pub fn is_process_alive(pid: u32) -> bool {
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output();
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
        Err(_) => false,
    }
}

/// Send the polite termination signal to a PID.
#[cfg(unix)]
pub fn terminate(pid: u32) -> anyhow::Result<()> {
    let raw_pid = i32::try_from(pid)?;
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(raw_pid),
        nix::sys::signal::Signal::SIGTERM,
    )?;
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> anyhow::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .status()?;
    anyhow::ensure!(status.success(), "taskkill exited with {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_pid(tmp.path()).is_none());

        write_pid_file(tmp.path()).unwrap();
        assert_eq!(read_pid(tmp.path()), Some(std::process::id()));

        remove_pid_file(tmp.path());
        assert!(read_pid(tmp.path()).is_none());
        // Removing again is harmless.
        remove_pid_file(tmp.path());
    }

    #[test]
    fn garbage_pid_file_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(smith_types::home::pid_path(tmp.path()), "not-a-pid").unwrap();
        assert!(read_pid(tmp.path()).is_none());
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn implausible_pid_is_not_alive() {
        assert!(!is_process_alive(u32::MAX));
    }
}
