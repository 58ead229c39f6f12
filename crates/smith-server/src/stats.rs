//! Machine stats sampled for `pong` replies.

use smith_types::SystemStats;

/// Sample the machine: CPU, memory, OS identity, uptime.
///
/// CPU is computed from the aggregated per-core tick counters when the
/// platform exposes them (`/proc/stat`), as
/// `round((total - idle) / total * 100)` over a single sample; elsewhere
/// the sysinfo load estimate stands in.
pub fn collect_stats() -> SystemStats {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();

    SystemStats {
        cpu_percent: cpu_percent(),
        memory_used_mb: sys.used_memory() / (1024 * 1024),
        memory_total_mb: sys.total_memory() / (1024 * 1024),
        os: sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        uptime_seconds: sysinfo::System::uptime(),
    }
}

#[cfg(target_os = "linux")]
fn cpu_percent() -> u32 {
    match std::fs::read_to_string("/proc/stat") {
        Ok(content) => parse_proc_stat(&content).unwrap_or(0),
        Err(_) => 0,
    }
}

#[cfg(not(target_os = "linux"))]
fn cpu_percent() -> u32 {
    let mut sys = sysinfo::System::new();
    sys.refresh_cpu_usage();
    sys.global_cpu_usage().round() as u32
}

/// Parse the aggregate `cpu` line of /proc/stat and apply the tick
/// formula. Idle time includes iowait.
#[cfg(target_os = "linux")]
fn parse_proc_stat(content: &str) -> Option<u32> {
    let line = content.lines().find(|l| {
        l.starts_with("cpu ") || l.starts_with("cpu\t")
    })?;
    let ticks: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|field| field.parse().ok())
        .collect();
    if ticks.len() < 4 {
        return None;
    }
    let total: u64 = ticks.iter().sum();
    if total == 0 {
        return None;
    }
    // Fields: user nice system idle iowait irq softirq steal ...
    let idle = ticks[3] + ticks.get(4).copied().unwrap_or(0);
    let busy = total.saturating_sub(idle) as f64;
    Some((busy / total as f64 * 100.0).round() as u32)
}
