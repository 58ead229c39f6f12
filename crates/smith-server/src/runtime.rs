//! Runtime glue: wires config, tools, browser host, and the protocol
//! server together, and tears everything down on shutdown signals.

use std::sync::Arc;

use tracing::{error, info};

use smith_browser::BrowserHost;
use smith_tools::Executor;
use smith_types::{home, AgentConfig, SmithError, ToolCategory, ToolContext};

use crate::server::ProtocolServer;

/// Assemble the full tool catalog: builtin categories plus the browser
/// category bound to a shared host.
pub fn build_executor(
    config: &AgentConfig,
    browser_host: Arc<BrowserHost>,
) -> Result<Executor, SmithError> {
    let mut catalog = smith_tools::register_all();
    catalog.register(ToolCategory::Browser, move || {
        smith_browser::browser_tools(Arc::clone(&browser_host))
    });
    Executor::new(&catalog, ToolContext::from_config(config))
}

/// Run the agent until a shutdown signal arrives.
///
/// Sets up the home directory and sandbox, installs the TLS crypto
/// provider, builds the enabled tool set, starts the browser idle reaper,
/// and serves the protocol until SIGINT/SIGTERM.
pub async fn run(config: AgentConfig) -> Result<(), SmithError> {
    config.validate()?;

    let home_dir = home::smith_home();
    home::ensure_home(&home_dir)?;
    std::fs::create_dir_all(&config.sandbox_dir).map_err(|e| {
        SmithError::Config(format!(
            "cannot create sandbox dir {}: {e}",
            config.sandbox_dir.display()
        ))
    })?;

    // Must happen before any TLS configuration is built.
    rustls::crypto::ring::default_provider().install_default().ok();

    let config = Arc::new(config);
    let browser_host = Arc::new(BrowserHost::new(home::browser_cache_dir(&home_dir)));
    let executor = Arc::new(build_executor(&config, Arc::clone(&browser_host))?);

    info!(
        name = %config.name,
        port = config.port,
        sandbox = %config.sandbox_dir.display(),
        readonly = config.readonly_mode,
        tools = executor.capabilities().len(),
        "agent starting"
    );

    let server = Arc::new(ProtocolServer::new(Arc::clone(&config), executor));

    let (reaper_tx, reaper_rx) = tokio::sync::watch::channel(false);
    let reaper = Arc::clone(&browser_host).spawn_reaper(reaper_rx);

    // Signal listener triggers the one shutdown path.
    let signal_server = Arc::clone(&server);
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        signal_server.shutdown().await;
    });

    let served = server.run().await;

    // Teardown: stop the reaper (closing the browser) and the listener.
    let _ = reaper_tx.send(true);
    let _ = reaper.await;
    signal_task.abort();

    if let Err(e) = &served {
        error!(error = %e, "server exited with error");
    }
    info!("agent stopped");
    served
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
