use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thingmirror::{ApiClient, ArtifactId, Config, Grouping, Mirror};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "warn,thingmirror=debug",
            LogLevel::Info => "warn,thingmirror=info",
            LogLevel::Warning => "warn",
        }
    }
}

#[derive(Parser)]
#[command(name = "thingmirror")]
#[command(about = "Incrementally mirror things from a Thingiverse-style API")]
#[command(version)]
struct Cli {
    /// Target directory for the mirror
    #[arg(short = 'd', long = "directory", global = true)]
    directory: Option<PathBuf>,

    /// Console log level
    #[arg(short = 'l', long = "log-level", value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Also write debug logs to this file
    #[arg(short = 'f', long = "log-file", global = true)]
    log_file: Option<PathBuf>,

    /// Stop a grouping at the first thing that is already current (assumes newest-first listings)
    #[arg(short = 'q', long, global = true)]
    quick: bool,

    /// Compress finished snapshots into archives
    #[arg(short = 'c', long, global = true)]
    compress: bool,

    /// API key (default: read from the configured key file)
    #[arg(short = 'a', long = "api-key", global = true)]
    api_key: Option<String>,

    /// Number of workers for `thing` requests
    #[arg(short = 'w', long, global = true)]
    workers: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror named collections of a user
    Collection {
        /// Collection owner
        owner: String,
        /// Collection names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Mirror things by ID
    Thing {
        /// Thing IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Mirror all designs of users
    User {
        /// User names
        #[arg(required = true)]
        users: Vec<String>,
    },
    /// Mirror all likes of users
    Likes {
        /// User names
        #[arg(required = true)]
        users: Vec<String>,
    },
    /// Run instructions from a batch file
    Batch {
        /// Batch file, one instruction per line
        file: PathBuf,
    },
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    let Some(command) = cli.command.take() else {
        eprintln!("{}", Cli::command().render_help());
        return ExitCode::FAILURE;
    };

    if matches!(command, Command::Version) {
        println!("thingmirror {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if let Err(e) = init_logging(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "aborting");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: LogLevel, log_file: Option<&Path>) -> std::io::Result<()> {
    let console = fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(level.directive()));

    let file = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_filter(EnvFilter::new(LogLevel::Debug.directive())),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(())
}

fn build_config(cli: &Cli) -> thingmirror::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(directory) = &cli.directory {
        config.mirror.target_dir = directory.clone();
    }
    if cli.quick {
        config.mirror.quick = true;
    }
    if cli.compress {
        config.mirror.compress = true;
    }
    if let Some(workers) = cli.workers {
        config.mirror.workers = workers;
    }
    if let Some(api_key) = &cli.api_key {
        config.api.api_key = Some(api_key.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, command: Command) -> thingmirror::Result<()> {
    let config = build_config(cli)?;
    let api_key = config.resolve_api_key()?;
    let client = Arc::new(ApiClient::new(&config.api, api_key, config.retry.clone())?);
    let mirror = Mirror::with_client(config, client)?;
    let base = mirror.target_dir().to_path_buf();

    let groupings: Vec<Grouping> = match command {
        Command::Thing { ids } => {
            let pool = mirror.start_pool();
            for id in ids {
                if let Err(e) = pool.enqueue(ArtifactId::new(id)) {
                    tracing::error!(error = %e, "could not queue thing");
                    break;
                }
            }
            pool.shutdown().await;
            return Ok(());
        }
        Command::Batch { file } => return mirror.run_batch(&file).await,
        Command::Version => return Ok(()),
        Command::Collection { owner, names } => names
            .iter()
            .map(|name| Grouping::collection(&owner, name, &base))
            .collect(),
        Command::User { users } => users
            .iter()
            .map(|user| Grouping::designs(user, &base))
            .collect(),
        Command::Likes { users } => users
            .iter()
            .map(|user| Grouping::likes(user, &base))
            .collect(),
    };

    for grouping in &groupings {
        if let Err(e) = mirror.sync_grouping(grouping).await {
            tracing::error!(grouping = %grouping.label(), error = %e, "grouping failed");
        }
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let mut cli = Cli::try_parse_from([
            "thingmirror",
            "-d",
            "/tmp/mirror",
            "-q",
            "-c",
            "-w",
            "3",
            "-a",
            "key",
            "user",
            "alice",
        ])
        .unwrap();
        assert!(matches!(cli.command.take(), Some(Command::User { .. })));

        let config = build_config(&cli).unwrap();
        assert_eq!(config.mirror.target_dir, PathBuf::from("/tmp/mirror"));
        assert!(config.mirror.quick);
        assert!(config.mirror.compress);
        assert_eq!(config.mirror.workers, 3);
        assert_eq!(config.resolve_api_key().unwrap(), "key");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli::try_parse_from(["thingmirror", "-w", "0", "thing", "1"]).unwrap();
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_missing_subcommand_parses_to_none() {
        let cli = Cli::try_parse_from(["thingmirror"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_log_level_accepts_warning() {
        let cli =
            Cli::try_parse_from(["thingmirror", "--log-level", "warning", "version"]).unwrap();
        assert!(matches!(cli.log_level, LogLevel::Warning));
    }
}
