//! `taxi-trips`: serve the trips API or inspect a cached partition.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use snafu::ResultExt;
use taxi_trips_core::{PartitionKey, PartitionLoad, Trip, TripQueryService};
use taxi_trips_server::{
    AppState, build_router,
    config::{CacheArgs, ServeArgs},
    error::{
        BindSnafu, InspectSnafu, InvalidPartitionSnafu, RenderSnafu, ServeSnafu, ServerError,
        ServerResult,
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "taxi_trips=info,taxi_trips_server=info,taxi_trips_core=info,tower_http=info";

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),

    /// Fetch (if needed) and print the first and last trips of one month
    Inspect {
        #[arg(long)]
        year: i32,

        #[arg(long)]
        month: u32,

        /// Trips to print from each end of the partition
        #[arg(long, default_value_t = 5)]
        rows: usize,

        #[command(flatten)]
        cache: CacheArgs,
    },
}

#[derive(Debug, Parser)]
#[command(name = "taxi-trips", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

async fn cmd_serve(args: ServeArgs) -> ServerResult<()> {
    let cache = args.cache.open_cache().await?;
    info!(
        "Caching partitions of {} under {}",
        args.cache.dataset,
        cache.root().path().display()
    );

    let service = TripQueryService::new(Arc::new(cache)).with_max_results(args.max_results);
    let mut state = AppState::new(service);
    if let Some(sink) = args.analytics.sink()? {
        info!("Recording request analytics to {}", sink.url());
        state = state.with_analytics(Arc::new(sink));
    }

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .context(BindSnafu { addr: args.listen })?;
    info!("Listening on {}", args.listen);

    axum::serve(listener, app)
        .await
        .context(ServeSnafu)
}

fn print_trips(trips: &[Trip]) -> ServerResult<()> {
    for trip in trips {
        let line = serde_json::to_string(trip).context(RenderSnafu)?;
        println!("{line}");
    }
    Ok(())
}

async fn cmd_inspect(year: i32, month: u32, rows: usize, cache: CacheArgs) -> ServerResult<()> {
    let key = PartitionKey::new(year, month).context(InvalidPartitionSnafu)?;
    let cache = cache.open_cache().await?;
    let service = TripQueryService::new(Arc::new(cache));

    let trips = match service.load(key).await.context(InspectSnafu)? {
        PartitionLoad::Trips(trips) => trips,
        PartitionLoad::NotFound { status } => {
            println!("Partition {key} is not published (upstream status {status})");
            return Ok(());
        }
        PartitionLoad::LoadFailed { reason } => {
            println!("Partition {key} could not be loaded: {reason}");
            return Ok(());
        }
    };

    println!("Partition {key}: {} trips", trips.len());
    if trips.len() <= rows.saturating_mul(2) {
        return print_trips(&trips);
    }
    print_trips(&trips[..rows])?;
    println!("...");
    print_trips(&trips[trips.len() - rows..])
}

async fn run() -> Result<(), ServerError> {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Inspect {
            year,
            month,
            rows,
            cache,
        } => cmd_inspect(year, month, rows, cache).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
