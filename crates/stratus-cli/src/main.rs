use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "stratus")]
#[command(version, about = "Stratus weather platform CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate quantized-mesh terrain tiles and layer.json
    Terrain(commands::terrain::TerrainArgs),

    /// Render map tiles from a data cube
    Tiles(commands::tiles::TilesArgs),

    /// Retention cleanup over versioned tile trees
    Retention(commands::retention::RetentionArgs),

    /// Archive manifest generation and validation
    Archive(commands::archive::ArchiveArgs),

    /// Run the cron-driven ingest scheduler
    Scheduler(commands::scheduler::SchedulerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stratus={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Terrain(args) => commands::terrain::execute(args).await,
        Commands::Tiles(args) => commands::tiles::execute(args).await,
        Commands::Retention(args) => commands::retention::execute(args).await,
        Commands::Archive(args) => commands::archive::execute(args).await,
        Commands::Scheduler(args) => commands::scheduler::execute(args).await,
    }
}
