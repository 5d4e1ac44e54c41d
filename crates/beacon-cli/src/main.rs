//! Beacon CLI - capture, drain and inspect the local event queue.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Beacon CLI - send product-analytics events from a shell.
#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Capture analytics events and manage the local delivery queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, queue and logs (default ~/.beacon)
    #[arg(long, env = "BEACON_HOME", global = true)]
    base_dir: Option<PathBuf>,

    /// Where the pending queue is persisted
    #[arg(long, default_value = "sqlite", global = true)]
    store: commands::StoreKind,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture one event and try to deliver it
    Capture {
        /// Event name
        event: String,

        /// Identifier of the user the event belongs to
        #[arg(short, long)]
        distinct_id: String,

        /// Event property as key=value (value parsed as JSON when possible)
        #[arg(short, long = "prop")]
        props: Vec<String>,

        /// How long to wait for delivery
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Inspect or drain the persisted queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show the number of persisted pending events
    Status,
    /// Deliver persisted events
    Drain {
        /// How long to keep draining
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,
    },
    /// Discard all persisted events
    Clear,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a configuration file
    Init {
        /// Project API key
        #[arg(long)]
        api_key: Option<String>,
        /// Ingestion host
        #[arg(long)]
        host: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env = match commands::CliEnv::load(cli.base_dir.clone(), cli.store) {
        Ok(env) => env,
        Err(e) => {
            output::print_error(&e.to_string(), &cli.format);
            std::process::exit(1);
        }
    };

    observability::init_with_config(observability::LogConfig {
        service_name: "beacon-cli".into(),
        default_level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| env.config.log_level.clone()),
        log_path: Some(env.paths.log_file()),
        also_stderr: false,
    });

    let result = match cli.command {
        Commands::Capture {
            event,
            distinct_id,
            props,
            timeout_ms,
        } => commands::capture(&env, &event, &distinct_id, &props, timeout_ms, &cli.format).await,
        Commands::Queue { command } => match command {
            QueueCommands::Status => commands::queue_status(&env, &cli.format),
            QueueCommands::Drain { timeout_ms } => {
                commands::queue_drain(&env, timeout_ms, &cli.format).await
            }
            QueueCommands::Clear => commands::queue_clear(&env, &cli.format),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_show(&env, &cli.format),
            ConfigCommands::Init {
                api_key,
                host,
                force,
            } => commands::config_init(&env, api_key, host, force, &cli.format),
        },
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}
