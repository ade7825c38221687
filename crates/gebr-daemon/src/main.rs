//! gebrd: GeBR worker daemon
//!
//! Prints the port token on stdout so the launching ssh session can learn
//! where to connect, then detaches and serves queue commands until
//! terminated. A second launch on the same host reports the running
//! instance's port and exits.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gebr_core::config::{self, GebrConfig};
use gebr_core::lockfile::{lock_path_in, local_hostname};
use gebr_core::types::ServerRole;
use gebr_daemon::{running_port, serve, spawn_scheduler, Instance, ShellRunner};

#[derive(Parser)]
#[command(name = "gebrd")]
#[command(about = "GeBR worker daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Stay attached and log to stderr
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config = GebrConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let lock_root = config
        .daemon
        .lock_root
        .clone()
        .unwrap_or_else(config::default_config_dir);
    let lock_path = lock_path_in(&lock_root, ServerRole::Worker, &local_hostname());

    if let Some(port) = running_port(&lock_path).context("Failed to read lock file")? {
        announce(&config, port)?;
        return Ok(());
    }

    let bind = args.bind.clone().unwrap_or_else(|| config.daemon.bind_address.clone());
    let listener = std::net::TcpListener::bind(&bind)
        .with_context(|| format!("Failed to bind {}", bind))?;
    listener.set_nonblocking(true)?;
    let port = listener.local_addr()?.port();

    // The launcher only needs this line; everything after runs detached
    announce(&config, port)?;
    if !args.foreground {
        detach()?;
    }

    init_logging(&args, &lock_path)?;
    if args.foreground {
        lead_process_group();
    }
    tracing::info!("gebrd starting on port {}", port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(run(listener, config, lock_path, port))
}

fn announce(config: &GebrConfig, port: u16) -> Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}{}", config.comm.port_prefix, port)?;
    stdout.flush()?;
    Ok(())
}

/// Fork, let the parent exit, and turn the child into a session leader
/// with its standard streams on `/dev/null`
#[cfg(unix)]
fn detach() -> Result<()> {
    use std::os::unix::io::AsRawFd;

    match unsafe { libc::fork() } {
        -1 => Err(std::io::Error::last_os_error()).context("fork failed"),
        0 => {
            gebr_core::lockfile::become_group_leader().context("setsid failed")?;
            let devnull = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open("/dev/null")?;
            for fd in 0..=2 {
                if unsafe { libc::dup2(devnull.as_raw_fd(), fd) } == -1 {
                    return Err(std::io::Error::last_os_error()).context("dup2 failed");
                }
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}

#[cfg(not(unix))]
fn detach() -> Result<()> {
    anyhow::bail!("Detaching is only supported on unix; use --foreground")
}

/// Kill signals the process group named by the lock file, so a foreground
/// daemon needs its own group as well
#[cfg(unix)]
fn lead_process_group() {
    if let Err(e) = gebr_core::lockfile::become_group_leader() {
        tracing::warn!("Failed to start a new process group: {}", e);
    }
}

#[cfg(not(unix))]
fn lead_process_group() {}

fn init_logging(args: &Args, lock_path: &Path) -> Result<()> {
    let log_level = if args.foreground { "debug" } else { args.log_level.as_str() };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
    );

    if args.foreground {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return Ok(());
    }

    let log_path = lock_path.with_file_name("gebrd.log");
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {:?}", log_path))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

async fn run(listener: std::net::TcpListener, config: GebrConfig, lock_path: PathBuf, port: u16) -> Result<()> {
    let _instance = Instance::create(lock_path.clone(), std::process::id(), port)
        .with_context(|| format!("Failed to write {:?}", lock_path))?;

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let runner = Arc::new(ShellRunner::new(&config.daemon.job_shell));
    let (scheduler, scheduler_task) = spawn_scheduler(runner, cancel.clone());

    let listener = TcpListener::from_std(listener)?;
    serve(listener, scheduler, cancel).await?;
    let _ = scheduler_task.await;

    tracing::info!("gebrd shutdown complete");
    Ok(())
}
