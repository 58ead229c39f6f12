//! Shared headless-browser host with acquire/release semantics and idle
//! eviction.
//!
//! One browser process serves every browser-tool invocation on the agent.
//! Callers [`BrowserHost::acquire`] the page driver behind an async mutex
//! (serial use per tool call), and a reaper task closes the browser after
//! five minutes without use. The next acquire relaunches it.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};

use crate::driver::PageDriver;
use crate::error::BrowserError;

/// Idle period after which the browser process is evicted.
pub const IDLE_EVICTION: Duration = Duration::from_secs(300);

/// Reaper tick period.
const REAPER_PERIOD: Duration = Duration::from_secs(60);

/// How long to wait for a fresh browser to expose its DevTools endpoint.
const LAUNCH_WAIT: Duration = Duration::from_secs(10);

/// Browser binaries probed in order.
const BROWSER_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

struct LiveBrowser {
    child: tokio::process::Child,
    driver: PageDriver,
}

struct HostState {
    live: Option<LiveBrowser>,
    last_used: Instant,
}

/// The process-wide browser singleton.
pub struct BrowserHost {
    cache_dir: PathBuf,
    state: Mutex<HostState>,
}

/// Exclusive access to the live page driver for one tool call.
pub struct PageLease<'a> {
    guard: MutexGuard<'a, HostState>,
}

impl PageLease<'_> {
    pub fn driver(&self) -> &PageDriver {
        // acquire() only returns a lease with a live browser present.
        &self.guard.live.as_ref().expect("lease without live browser").driver
    }
}

impl BrowserHost {
    /// Create the host. Nothing is launched until the first acquire.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            state: Mutex::new(HostState {
                live: None,
                last_used: Instant::now(),
            }),
        }
    }

    /// Acquire the shared page, launching the browser if needed.
    ///
    /// The returned lease holds the host lock: concurrent browser tools
    /// serialize here, which is the acquire-use-release discipline the
    /// shared singleton requires.
    pub async fn acquire(&self) -> Result<PageLease<'_>, BrowserError> {
        let mut guard = self.state.lock().await;
        guard.last_used = Instant::now();

        // A crashed browser leaves a dead child; relaunch transparently.
        let alive = match &mut guard.live {
            Some(live) => matches!(live.child.try_wait(), Ok(None)),
            None => false,
        };
        if !alive {
            if guard.live.take().is_some() {
                tracing::warn!("browser process died, relaunching");
            }
            let live = launch(&self.cache_dir).await?;
            guard.live = Some(live);
        }
        Ok(PageLease { guard })
    }

    /// Seconds since the last acquire.
    pub async fn idle(&self) -> Duration {
        self.state.lock().await.last_used.elapsed()
    }

    /// Whether a browser process is currently live.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.live.is_some()
    }

    /// Close the browser if it has been idle past the eviction threshold.
    pub async fn evict_if_idle(&self) {
        let mut guard = self.state.lock().await;
        if guard.live.is_some() && guard.last_used.elapsed() >= IDLE_EVICTION {
            tracing::info!("evicting idle browser");
            close_live(&mut guard).await;
        }
    }

    /// Close the browser unconditionally (shutdown path). Idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.state.lock().await;
        close_live(&mut guard).await;
    }

    /// Spawn the periodic idle reaper. It stops (closing any live
    /// browser) once the shutdown signal flips.
    pub fn spawn_reaper(
        self: std::sync::Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let host = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAPER_PERIOD);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => host.evict_if_idle().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            host.shutdown().await;
                            return;
                        }
                    }
                }
            }
        })
    }
}

async fn close_live(state: &mut HostState) {
    if let Some(mut live) = state.live.take() {
        let _ = live.child.start_kill();
        let _ = live.child.wait().await;
    }
}

/// Launch a headless browser and connect to its first page target.
async fn launch(cache_dir: &std::path::Path) -> Result<LiveBrowser, BrowserError> {
    let binary = find_binary().await?;
    let port = free_port()?;

    std::fs::create_dir_all(cache_dir)
        .map_err(|e| BrowserError::NotReady(format!("cannot create profile dir: {e}")))?;

    let mut child = tokio::process::Command::new(&binary)
        .arg("--headless=new")
        .arg(format!("--remote-debugging-port={port}"))
        .arg(format!("--user-data-dir={}", cache_dir.display()))
        .arg("--no-first-run")
        .arg("--disable-gpu")
        .arg("about:blank")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BrowserError::NotReady(format!("cannot spawn {binary}: {e}")))?;

    tracing::info!(binary, port, "launched headless browser");

    match wait_for_target(port).await {
        Ok(ws_url) => {
            let driver = PageDriver::connect(&ws_url).await?;
            Ok(LiveBrowser { child, driver })
        }
        Err(e) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(e)
        }
    }
}

async fn find_binary() -> Result<String, BrowserError> {
    let adapter = smith_shell::ShellAdapter::new();
    for candidate in BROWSER_BINARIES {
        if adapter.which(candidate).await.is_some() {
            return Ok(candidate.to_string());
        }
    }
    Err(BrowserError::NoBinary(BROWSER_BINARIES.join(", ")))
}

/// Let the OS pick a free port, then hand it to the browser.
fn free_port() -> Result<u16, BrowserError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| BrowserError::NotReady(format!("cannot probe for a free port: {e}")))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| BrowserError::NotReady(e.to_string()))
}

/// Poll the DevTools HTTP endpoint until a page target appears.
async fn wait_for_target(port: u16) -> Result<String, BrowserError> {
    let url = format!("http://127.0.0.1:{port}/json/list");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| BrowserError::NotReady(e.to_string()))?;

    let deadline = Instant::now() + LAUNCH_WAIT;
    loop {
        if let Ok(response) = client.get(&url).send().await {
            if let Ok(targets) = response.json::<serde_json::Value>().await {
                let page = targets.as_array().and_then(|list| {
                    list.iter().find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
                });
                if let Some(ws_url) = page
                    .and_then(|t| t.get("webSocketDebuggerUrl"))
                    .and_then(|v| v.as_str())
                {
                    return Ok(ws_url.to_string());
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::NotReady(format!(
                "no page target on port {port} after {LAUNCH_WAIT:?}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_starts_idle_and_not_running() {
        let tmp = tempfile::tempdir().unwrap();
        let host = BrowserHost::new(tmp.path().to_path_buf());
        assert!(!host.is_running().await);
        assert!(host.idle().await < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn evict_and_shutdown_are_noops_without_browser() {
        let tmp = tempfile::tempdir().unwrap();
        let host = BrowserHost::new(tmp.path().to_path_buf());
        host.evict_if_idle().await;
        host.shutdown().await;
        host.shutdown().await;
        assert!(!host.is_running().await);
    }

    #[test]
    fn free_port_is_plausible() {
        let port = free_port().unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn reaper_exits_on_shutdown_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let host = std::sync::Arc::new(BrowserHost::new(tmp.path().to_path_buf()));
        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = std::sync::Arc::clone(&host).spawn_reaper(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reaper should exit promptly")
            .unwrap();
    }
}
