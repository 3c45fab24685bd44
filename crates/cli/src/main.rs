mod commands;

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process;
use strata_engine::{Direction, MigrationConfig, MigrationError, MigrationResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::*;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Grouped, time-ordered database migrations")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./strata.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory holding the migration groups
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Connection string of the target database
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new migration file
    Generate {
        /// Migration name, slugified into the filename
        name: String,

        /// Target group (defaults to the highest-prefixed group)
        #[arg(long, short)]
        group: Option<String>,

        /// Include a DOWN section in the template
        #[arg(long)]
        reversible: bool,
    },

    /// Apply pending migrations
    Up {
        /// Group to migrate (defaults to the highest-prefixed group)
        #[arg(long, short)]
        group: Option<String>,

        /// Stop after this identifier (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Print the plan without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert applied migrations, newest first
    Down {
        /// Group to revert (defaults to the highest-prefixed group)
        #[arg(long, short)]
        group: Option<String>,

        /// Stop after this identifier (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Print the plan without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the state of every migration in a group
    Status {
        /// Group to inspect (defaults to the highest-prefixed group)
        #[arg(long, short)]
        group: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create the next migration group
    Group {
        /// Group name; the numeric prefix is assigned automatically
        name: String,
    },

    /// List migration groups
    Groups,
}

impl Cli {
    /// Configuration file and environment, then command-line flags
    fn load_config(&self) -> MigrationResult<MigrationConfig> {
        let mut config = MigrationConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.dir {
            config = config.with_migrations_dir(dir.clone());
        }
        if let Some(url) = &self.database_url {
            config = config.with_database_url(url.clone());
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

async fn dispatch(cli: Cli) -> Result<(), MigrationError> {
    let config = cli.load_config()?;

    match cli.command {
        Commands::Generate {
            name,
            group,
            reversible,
        } => {
            migrate::generate(&config, &name, group, reversible)?;
        }
        Commands::Up { group, to, dry_run } => {
            migrate::run(&config, Direction::Up, group, to, dry_run).await?;
        }
        Commands::Down { group, to, dry_run } => {
            migrate::run(&config, Direction::Down, group, to, dry_run).await?;
        }
        Commands::Status { group, json } => {
            migrate::status(&config, group, json).await?;
        }
        Commands::Group { name } => {
            group::create(&config, &name)?;
        }
        Commands::Groups => {
            group::list(&config)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(error) = dispatch(cli).await {
        eprintln!("{} {}", style("error:").red().bold(), error);
        process::exit(1);
    }
}
