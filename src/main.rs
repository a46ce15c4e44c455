mod cli_logger;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::net::SocketAddr;
use std::path::PathBuf;

use cli_logger::CliLogger;
use profhub::{Config, HumanDuration, sanitize_args, serve};

#[derive(Debug, Parser)]
#[command(name = "profhub", version, about = "Store and serve performance-profile captures")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "profhub.toml")]
    config: PathBuf,

    /// Emit machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    /// Structured JSON log lines instead of the human formatter.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Mirror the store to this JSON file.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long)]
        command_timeout: Option<HumanDuration>,
    },
    /// Print the effective configuration.
    Config,
    /// Show how `/api/exec` would sanitize the given arguments.
    Sanitize {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let logger = CliLogger::new(cli.json, cli.no_color);
    if let Err(err) = run(cli, &logger) {
        logger.print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli, logger: &CliLogger) -> anyhow::Result<()> {
    let mut config = Config::load_optional(&cli.config);
    match cli.command {
        Command::Serve {
            bind,
            snapshot,
            command_timeout,
        } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }
            if let Some(timeout) = command_timeout {
                config.command_timeout = timeout;
            }
            let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
            runtime
                .block_on(serve(config))
                .context("serving HTTP API")?;
            Ok(())
        }
        Command::Config => logger.print_serialized(&config),
        Command::Sanitize { args } => logger.print_serialized(&sanitize_args(&args)),
    }
}
