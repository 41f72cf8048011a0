use chrono::{Local, NaiveDate};
use civic311::boundary::{BoundarySource, FileBoundarySource, HttpBoundarySource};
use civic311::config::{Config, ConfigLoader};
use civic311::pipeline::Pipeline;
use civic311::report::{render, OutputFormat};
use civic311::warehouse::{BigQueryClient, InMemorySource, TableSource};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Count 311 service requests per council district and category
#[derive(Parser)]
#[command(name = "civic311")]
#[command(
    about = "Join 311 service requests to district boundaries and count them",
    long_about = None
)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full extract, join and aggregate pipeline
    Run {
        /// Path to configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Read service requests from a CSV snapshot instead of the warehouse
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Read district boundaries from a saved GeoJSON or ArcGIS JSON file
        #[arg(long)]
        boundaries: Option<PathBuf>,

        /// Output format (overrides the configuration file)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Reference date for the year filter and trailing window (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print the compiled warehouse query without running it
    Sql {
        /// Path to configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Reference date for the year filter (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,reqwest=debug", // -vvv shows everything including dependencies
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("civic311 started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Run {
            config,
            snapshot,
            boundaries,
            format,
            today,
        } => run_pipeline(config, snapshot, boundaries, format, today).await,
        Commands::Sql { config, today } => print_sql(config, today).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let loader = match path {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    Ok(loader.load().await?)
}

fn today_or_local(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Local::now().date_naive())
}

async fn run_pipeline(
    config: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    boundaries: Option<PathBuf>,
    format: Option<OutputFormat>,
    today: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let config = load_config(config).await?;
    let today = today_or_local(today);
    let format = format.unwrap_or(config.output.format);

    let requests: Box<dyn TableSource> = match snapshot {
        Some(path) => Box::new(InMemorySource::from_csv(&path)?),
        None => Box::new(BigQueryClient::new(config.warehouse.clone())?),
    };

    let districts: Box<dyn BoundarySource> = match boundaries {
        Some(path) => Box::new(FileBoundarySource::new(path, config.boundaries.clone())),
        None => Box::new(HttpBoundarySource::new(config.boundaries.clone())?),
    };

    let output = Pipeline::new(config, requests, districts).run(today).await?;
    print!("{}", render(&output.aggregate, format)?);
    Ok(())
}

async fn print_sql(config: Option<PathBuf>, today: Option<NaiveDate>) -> anyhow::Result<()> {
    let config = load_config(config).await?;
    let sql = civic311::extract::preview_sql(&config, today_or_local(today))?;
    println!("{sql}");
    Ok(())
}
