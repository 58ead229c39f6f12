//! The `smith` command-line front-end: init, start, stop, status.

mod persistence;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smith_types::{home, load_config, AgentConfig, CONFIG_FILENAME};

/// Remote execution agent: a controller connects over a persistent
/// channel and pushes tool invocations that run inside a confined
/// workspace.
#[derive(Parser)]
#[command(name = "smith", version, about)]
struct Cli {
    /// Path to smith.toml (defaults to ./smith.toml, then the home dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of config.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the home directory and a default smith.toml.
    Init {
        /// Agent instance name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the agent in the foreground until SIGINT/SIGTERM.
    Start,
    /// Stop a running agent.
    Stop,
    /// Report whether the agent is running.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { name } => init(name.as_deref()),
        Commands::Start => start(cli.config.as_deref(), cli.verbose).await,
        Commands::Stop => stop(),
        Commands::Status => status(cli.config.as_deref()),
    }
}

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn init(name: Option<&str>) -> anyhow::Result<()> {
    let home_dir = home::smith_home();
    home::ensure_home(&home_dir).context("failed to create home directory")?;

    let config_path = PathBuf::from(CONFIG_FILENAME);
    if config_path.exists() {
        println!("{} already exists, leaving it untouched.", config_path.display());
        return Ok(());
    }

    let sandbox_dir = std::env::current_dir()?.join("sandbox");
    std::fs::create_dir_all(&sandbox_dir)?;

    let config = AgentConfig::default_for(name.unwrap_or("smith-agent"), sandbox_dir.clone());
    std::fs::write(&config_path, config.to_toml()?)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("Initialized agent {:?}.", config.name);
    println!("  config:  {}", config_path.display());
    println!("  sandbox: {}", sandbox_dir.display());
    println!("  home:    {}", home_dir.display());
    println!("Run `smith start` to bring the agent up.");
    Ok(())
}

async fn start(config_path: Option<&std::path::Path>, verbose: bool) -> anyhow::Result<()> {
    let home_dir = home::smith_home();
    home::ensure_home(&home_dir).context("failed to create home directory")?;

    let config = load_config(config_path, &home_dir).context("failed to load configuration")?;
    init_tracing(&config.log_level, verbose);

    if let Some(pid) = persistence::read_pid(&home_dir) {
        if persistence::is_process_alive(pid) {
            anyhow::bail!("agent already running (PID {pid}); use `smith stop` first");
        }
        tracing::warn!(pid, "clearing stale PID file");
        persistence::remove_pid_file(&home_dir);
    }

    persistence::write_pid_file(&home_dir)?;
    let served = smith_server::run(config).await;
    persistence::remove_pid_file(&home_dir);
    served.context("agent exited with an error")
}

fn stop() -> anyhow::Result<()> {
    let home_dir = home::smith_home();
    let Some(pid) = persistence::read_pid(&home_dir) else {
        println!("Agent is not running (no PID file).");
        return Ok(());
    };
    if !persistence::is_process_alive(pid) {
        println!("Agent is not running (stale PID {pid}); clearing PID file.");
        persistence::remove_pid_file(&home_dir);
        return Ok(());
    }

    persistence::terminate(pid).with_context(|| format!("failed to signal PID {pid}"))?;

    // Give the agent time to close connections and exit.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while std::time::Instant::now() < deadline {
        if !persistence::is_process_alive(pid) {
            persistence::remove_pid_file(&home_dir);
            println!("Agent stopped (was PID {pid}).");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    anyhow::bail!("agent (PID {pid}) did not exit within 10s")
}

fn status(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let home_dir = home::smith_home();

    match persistence::read_pid(&home_dir) {
        Some(pid) if persistence::is_process_alive(pid) => {
            println!("Agent running (PID {pid}).");
        }
        Some(pid) => println!("Agent not running (stale PID file for {pid})."),
        None => println!("Agent not running."),
    }

    match load_config(config_path, &home_dir) {
        Ok(config) => {
            println!("  name:     {}", config.name);
            println!("  port:     {}", config.port);
            println!("  sandbox:  {}", config.sandbox_dir.display());
            println!("  readonly: {}", config.readonly_mode);
        }
        Err(e) => println!("  (no loadable config: {e})"),
    }
    Ok(())
}
