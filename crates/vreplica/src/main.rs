use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vreplica_core::{from_yaml, to_json, to_json_pretty, to_yaml};
use vreplica_scheduler::{
    ApiClient, ClusterFixture, ScaleCache, ScaleCacheConfig, State, StateBuilder, VPodClient,
};

#[derive(Parser)]
#[command(name = "vreplica", about = "Virtual replica scheduling state inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one scheduling state snapshot and print it
    Snapshot {
        #[command(flatten)]
        sources: SourceArgs,
        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        output: OutputFormat,
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Rebuild the snapshot periodically and log a summary until interrupted
    Watch {
        #[command(flatten)]
        sources: SourceArgs,
        /// Seconds between snapshots
        #[arg(long, default_value = "10")]
        interval_secs: u64,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Cluster fixture (YAML or JSON) declaring the pool and its VPods
    #[arg(long)]
    fixture: String,
    /// Read pool size and worker pods from this API server instead of the fixture
    #[arg(long, env = "VREPLICA_API_URL")]
    api_url: Option<String>,
    /// Namespace of the worker pool, overrides the fixture
    #[arg(long)]
    namespace: Option<String>,
    /// Name of the worker pool StatefulSet, overrides the fixture
    #[arg(long)]
    pool: Option<String>,
    /// Vreplicas per worker, overrides the fixture
    #[arg(long)]
    capacity: Option<i32>,
    /// Maximum age of the cached pool size in seconds
    #[arg(long, default_value = "300")]
    refresh_period_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot {
            sources,
            output,
            pretty,
        } => run_snapshot(&sources, output, pretty).await,
        Commands::Watch {
            sources,
            interval_secs,
        } => run_watch(&sources, Duration::from_secs(interval_secs)).await,
    }
}

/// Build a single snapshot and print it to stdout
async fn run_snapshot(sources: &SourceArgs, output: OutputFormat, pretty: bool) -> miette::Result<()> {
    let (builder, _) = create_builder(sources).await?;
    let state = builder.build().await?;
    println!("{}", render(&state, output, pretty)?);
    Ok(())
}

/// Build snapshots on an interval while a background task keeps the pool size fresh
async fn run_watch(sources: &SourceArgs, interval: Duration) -> miette::Result<()> {
    if interval.is_zero() {
        return Err(miette::miette!("--interval-secs must be greater than zero"));
    }

    let (builder, scale_cache) = create_builder(sources).await?;
    let token = CancellationToken::new();

    let refresher_token = token.clone();
    let refresher_handle = tokio::spawn(async move {
        scale_cache.run(refresher_token).await;
    });

    let shutdown_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down gracefully..."),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
        shutdown_token.cancel();
    });

    info!(
        "Watching pool {} every {:?}",
        builder.pool_name(),
        interval
    );

    let mut ticker = tokio::time::interval(interval);
    while !token.is_cancelled() {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match builder.build_with_cancel(&token).await {
            Ok(state) => info!(
                "Pool {}: {}/{} schedulable, free capacity {}, pending vreplicas {}",
                state.pool_name,
                state.schedulable_pods.len(),
                state.replicas,
                state.free_capacity(),
                state.total_pending()
            ),
            Err(e) => error!("Failed to build state: {}", e),
        }
    }

    join_refresher(refresher_handle).await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for the background refresher, reporting whether it exited cleanly
async fn join_refresher(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("Scale cache refresher task failed: {}", e);
            false
        }
    }
}

/// Load a cluster fixture from disk
fn load_fixture(path: &Path) -> miette::Result<ClusterFixture> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read fixture '{}': {}", path.display(), e))?;
    Ok(from_yaml(&data)?)
}

/// Wire the state builder from the fixture, optionally backed by a live API server
async fn create_builder(sources: &SourceArgs) -> miette::Result<(StateBuilder, Arc<ScaleCache>)> {
    let mut fixture = load_fixture(Path::new(&sources.fixture))?;
    if let Some(namespace) = &sources.namespace {
        fixture.namespace = namespace.clone();
    }
    if let Some(pool) = &sources.pool {
        fixture.pool_name = pool.clone();
    }
    if let Some(capacity) = sources.capacity {
        fixture.capacity = capacity;
    }

    let config = ScaleCacheConfig {
        refresh_period: Duration::from_secs(sources.refresh_period_secs),
    };

    let Some(api_url) = &sources.api_url else {
        info!("Using fixture {} for pool {}", sources.fixture, fixture.pool_name);
        let cluster = fixture.into_cluster(config).await?;
        return Ok((cluster.builder, cluster.scale_cache));
    };

    info!(
        "Using API server {} for pool {}/{}",
        api_url, fixture.namespace, fixture.pool_name
    );
    fixture.validate()?;

    let api_client = Arc::new(ApiClient::new(api_url, &fixture.namespace));

    let vpods = Arc::new(VPodClient::new());
    for vpod in fixture.vpods {
        vpods
            .create(
                &vpod.key.namespace,
                &vpod.key.name,
                vpod.vreplicas,
                vpod.placements,
            )
            .await;
    }

    let scale_cache = Arc::new(ScaleCache::new(
        fixture.pool_name.clone(),
        api_client.clone(),
        config,
    ));
    let builder = StateBuilder::new(
        fixture.pool_name,
        fixture.capacity,
        vpods,
        api_client,
        scale_cache.clone(),
    )?;

    Ok((builder, scale_cache))
}

fn render(state: &State, output: OutputFormat, pretty: bool) -> miette::Result<String> {
    let rendered = match (output, pretty) {
        (OutputFormat::Json, false) => to_json(state)?,
        (OutputFormat::Json, true) => to_json_pretty(state)?,
        (OutputFormat::Yaml, _) => to_yaml(state)?,
    };
    Ok(rendered)
}
