mod cmd;
mod settings;
mod shutdown;

use clap::{Parser, Subcommand};
use settings::SettingsArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "blacklist",
    about = "IP blacklist service: HTTP API plus archive and expiry workers",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML settings file; flags and environment variables override it
    #[arg(long, global = true, env = "BLACKLIST_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the public and internal APIs together with the lifecycle workers
    Serve {
        /// Keep records in process memory instead of Postgres
        #[arg(long)]
        memory: bool,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Run one archive pass and one expiry pass, then exit
    Sweep,
}

fn main() {
    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } | Commands::Sweep => tracing::Level::INFO,
        Commands::Migrate => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = cli
        .settings
        .resolve(cli.config.as_deref())
        .and_then(|settings| match cli.command {
            Commands::Serve { memory } => cmd::serve::run(settings, memory),
            Commands::Migrate => cmd::migrate::run(&settings),
            Commands::Sweep => cmd::sweep::run(settings, cli.json),
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
