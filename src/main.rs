//! Vector search sweep benchmark CLI.
//!
//! ```bash
//! # Create, index and populate a collection
//! vsbench load 127.0.0.1 19530 ann_1m_sq8 128 --count 100000
//!
//! # Sweep nq x topK with 8 concurrent workers, nprobe 16
//! vsbench sweep 127.0.0.1 19530 ann_1m_sq8 128 16 8
//!
//! # Drop the collection again
//! vsbench drop 127.0.0.1 19530 ann_1m_sq8
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vsbench::client::{self, CollectionSpec, IndexSpec, IndexType, MetricType};
use vsbench::runner::{prepare_collection, teardown_collection, LoadPlan};
use vsbench::workload::read_fvecs;
use vsbench::{
    ClientConfig, ConfigurationMatrix, HttpClient, ReportSink, ResultsReporter, SearchClient,
    SweepController, SweepError, SweepParameters, SweepSettings, VectorPool,
};

#[derive(Parser)]
#[command(name = "vsbench")]
#[command(version, about = "Concurrent nq/topK sweep benchmark for vector search services")]
struct Cli {
    /// Debug-level logging (per-repetition progress)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep every nq x topK combination against a populated collection
    Sweep(SweepArgs),

    /// Create, index and populate a collection
    Load(LoadArgs),

    /// Drop a collection and its index
    Drop(ServerArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Server host
    host: String,

    /// Server port
    port: u16,

    /// Collection (table) name
    table: String,

    /// Bearer token for authenticated servers
    #[arg(long, env = "VSBENCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl ServerArgs {
    fn client_config(&self, pool_size: usize) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            port: self.port,
            timeout_secs: self.timeout_secs,
            pool_size,
            auth_token: self.token.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Vector dimension of the collection
    dimension: usize,

    /// Search refinement parameter (IVF probes)
    nprobe: u32,

    /// Concurrent workers per configuration
    concurrency: usize,

    /// Properties file overriding querys / nq / topks
    #[arg(long, default_value = vsbench::config::DEFAULT_PROPERTIES_FILE)]
    properties: PathBuf,

    /// Directory for the CSV report
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of query vectors to generate
    #[arg(long, default_value_t = 10_000)]
    pool_size: usize,

    /// Read query vectors from an fvecs file instead of generating them
    #[arg(long)]
    query_file: Option<PathBuf>,

    /// Seed for the generated query vectors
    #[arg(long)]
    seed: Option<u64>,

    /// Pause before the first configuration, in seconds
    #[arg(long, default_value_t = 5)]
    settle_secs: u64,
}

#[derive(Args, Debug)]
struct LoadArgs {
    #[command(flatten)]
    server: ServerArgs,

    /// Vector dimension of the collection
    dimension: usize,

    /// Number of random vectors to insert
    #[arg(long, default_value_t = 1000)]
    count: usize,

    /// Insert vectors from an fvecs file (up to --count) instead of random ones
    #[arg(long)]
    base_file: Option<PathBuf>,

    /// Vectors per insert request
    #[arg(long, default_value_t = 1000)]
    batch: usize,

    #[arg(long, value_enum, default_value_t = MetricType::Ip)]
    metric: MetricType,

    #[arg(long, value_enum, default_value_t = IndexType::IvfSq8)]
    index_type: IndexType,

    /// IVF cluster count
    #[arg(long, default_value_t = 1024)]
    nlist: u32,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // Each worker must be able to sit on its own OS thread.
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let worker_threads = match &cli.command {
        Commands::Sweep(args) => args.concurrency.max(cores),
        _ => cores,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Sweep(args) => sweep(args).await,
            Commands::Load(args) => load(args).await,
            Commands::Drop(args) => drop_collection(args).await,
        }
    })
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn connect(config: ClientConfig) -> Result<Arc<HttpClient>> {
    let endpoint = config.endpoint();
    let client = client::connect(config)
        .await
        .map_err(|e| SweepError::Connect {
            endpoint: endpoint.clone(),
            message: format!("{e:#}"),
        })?;
    tracing::info!(endpoint = %endpoint, connected = client.is_connected(), "connected");
    Ok(client)
}

async fn sweep(args: SweepArgs) -> Result<()> {
    let settings = SweepSettings::load(Some(&args.properties))
        .context("Failed to load sweep settings")?;
    tracing::info!(
        nq = ?settings.batch_sizes,
        topks = ?settings.top_ks,
        querys = settings.repetitions,
        "sweep settings"
    );

    let client = connect(args.server.client_config(args.concurrency))
        .await
        .context("Connect step failed")?;

    let pool = match &args.query_file {
        Some(path) => {
            let vectors = read_fvecs(path, Some(args.pool_size))?;
            VectorPool::from_vectors(vectors, args.dimension)
                .with_context(|| format!("Query file {} does not fit the table", path.display()))?
        }
        None => match args.seed {
            Some(seed) => VectorPool::seeded(args.pool_size, args.dimension, seed),
            None => VectorPool::from_entropy(args.pool_size, args.dimension),
        },
    };

    let matrix = ConfigurationMatrix::new(&settings.batch_sizes, &settings.top_ks)
        .context("Invalid configuration matrix")?;

    let params = SweepParameters {
        table: args.server.table.clone(),
        nprobe: args.nprobe,
        concurrency: args.concurrency,
        repetitions: settings.repetitions,
        dimension: args.dimension,
    };

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;
    let report_path =
        ReportSink::report_path(&args.output_dir, &params.table, params.nprobe, params.concurrency);

    let controller = SweepController::new(client, params, matrix, pool, report_path)
        .context("Sweep setup failed")?;

    if args.settle_secs > 0 {
        tracing::info!(seconds = args.settle_secs, "waiting before first configuration");
        tokio::time::sleep(Duration::from_secs(args.settle_secs)).await;
    }

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Ctrl-C handler unavailable; sweep cannot be interrupted");
            std::future::pending::<()>().await;
        }
    };

    let summary = controller.run_until(shutdown).await.context("Sweep failed")?;

    ResultsReporter::print_summary(&summary.rows, &summary.report_path);
    if summary.failed_queries > 0 {
        tracing::warn!(
            failed = summary.failed_queries,
            "some searches failed; see warnings above"
        );
    }
    tracing::info!(
        elapsed_secs = summary.elapsed.as_secs_f64(),
        report = %summary.report_path.display(),
        "sweep complete"
    );
    Ok(())
}

async fn load(args: LoadArgs) -> Result<()> {
    let client = connect(args.server.client_config(8))
        .await
        .context("Connect step failed")?;
    let table = args.server.table.clone();

    let vectors = match &args.base_file {
        Some(path) => read_fvecs(path, Some(args.count))?,
        None => {
            let pool = match args.seed {
                Some(seed) => VectorPool::seeded(args.count, args.dimension, seed),
                None => VectorPool::from_entropy(args.count, args.dimension),
            };
            pool.vectors().to_vec()
        }
    };

    let plan = LoadPlan {
        collection: CollectionSpec {
            name: table.clone(),
            dimension: args.dimension,
            metric: args.metric,
        },
        index: IndexSpec {
            collection: table.clone(),
            index_type: args.index_type,
            metric: args.metric,
            nlist: args.nlist,
        },
        insert_batch: args.batch,
        settle: Duration::from_secs(1),
    };

    let report = prepare_collection(client.as_ref(), &plan, &vectors)
        .await
        .with_context(|| format!("Failed to prepare collection {table}"))?;

    println!("Collection {} ready", table);
    println!("  Inserted:  {}", report.inserted);
    println!("  Row count: {}", report.row_count);
    println!("  Index:     {}", report.index);
    Ok(())
}

async fn drop_collection(args: ServerArgs) -> Result<()> {
    let client = connect(args.client_config(1))
        .await
        .context("Connect step failed")?;
    teardown_collection(client.as_ref(), &args.table)
        .await
        .with_context(|| format!("Failed to drop collection {}", args.table))
}
