//! gebr: command-line client for GeBR orchestrators and workers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gebr_cli::commands::{self, ConnectOptions};
use gebr_cli::output::print_error;
use gebr_core::config::{self, GebrConfig};
use gebr_core::types::ServerRole;
use gebr_daemon::QueueCommand;

#[derive(Parser)]
#[command(name = "gebr")]
#[command(author, version, about = "Connect to GeBR orchestrators and workers over ssh")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Fail instead of asking for passwords or host key confirmation
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Worker,
    Orchestrator,
}

impl From<Role> for ServerRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Worker => ServerRole::Worker,
            Role::Orchestrator => ServerRole::Orchestrator,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server on a host (if needed) and log in to it
    Connect {
        /// Host name or address; "localhost" runs the server locally
        host: String,
        #[arg(short, long, value_enum, default_value = "worker")]
        role: Role,
        /// Forward this remote X display to the local one after login
        #[arg(long, value_name = "DISPLAY")]
        x11: Option<u16>,
        /// Stay connected until Ctrl+C
        #[arg(long)]
        hold: bool,
        /// Install the gebr public key on the host after login
        #[arg(long)]
        use_public_key: bool,
        /// Attempts after the first failure (overrides config)
        #[arg(long)]
        retries: Option<u32>,
        /// Seconds to wait for each attempt (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Stop the server running on a host
    Kill {
        host: String,
        #[arg(short, long, value_enum, default_value = "worker")]
        role: Role,
    },

    /// Add the gebr public key to a host's authorized keys
    AppendKey { host: String },

    /// Talk to the job queues of a worker
    Queue {
        host: String,
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Submit a shell command; an empty queue name runs it at once
    Submit { queue: String, command: String },
    /// Drop a queue and its waiting jobs
    Remove { queue: String },
    /// Whether a job of the queue is running
    Busy { queue: String },
    /// Whether the queue has waiting jobs
    Next { queue: String },
    /// List queue names
    Names,
}

impl From<QueueAction> for QueueCommand {
    fn from(action: QueueAction) -> Self {
        match action {
            QueueAction::Submit { queue, command } => QueueCommand::Submit { queue, command },
            QueueAction::Remove { queue } => QueueCommand::Remove { queue },
            QueueAction::Busy { queue } => QueueCommand::IsBusy { queue },
            QueueAction::Next { queue } => QueueCommand::HasNext { queue },
            QueueAction::Names => QueueCommand::Names,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Get specific config value
    Get { key: String },
    /// Set config value
    Set { key: String, value: String },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let interactive = !cli.non_interactive;

    match cli.command {
        Commands::Connect {
            host,
            role,
            x11,
            hold,
            use_public_key,
            retries,
            timeout,
        } => {
            let mut config = load(&config_path)?;
            if let Some(retries) = retries {
                config.cli.max_retries = retries;
            }
            if let Some(timeout) = timeout {
                config.cli.connect_timeout = std::time::Duration::from_secs(timeout);
            }
            let options = ConnectOptions {
                x11,
                hold,
                interactive,
                use_public_key,
            };
            commands::connect_command(&config, &host, role.into(), options).await?;
        }

        Commands::Kill { host, role } => {
            let config = load(&config_path)?;
            commands::kill_command(&config, &host, role.into(), interactive).await?;
        }

        Commands::AppendKey { host } => {
            let config = load(&config_path)?;
            commands::append_key_command(&config, &host, interactive).await?;
        }

        Commands::Queue { host, action } => {
            let config = load(&config_path)?;
            commands::queue_command(&config, &host, action.into(), interactive).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(cli.config.as_ref())?,
            ConfigAction::Init { force } => commands::config_init(cli.config.as_ref(), force)?,
            ConfigAction::Get { key } => commands::config_get(cli.config.as_ref(), &key)?,
            ConfigAction::Set { key, value } => {
                commands::config_set(cli.config.as_ref(), &key, &value)?
            }
            ConfigAction::Path => println!("{}", config_path.display()),
        },
    }

    Ok(())
}

fn load(path: &Path) -> Result<GebrConfig> {
    GebrConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}
