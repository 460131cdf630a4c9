//! CLI entry point for the FAMAS parking collector.
//!
//! Provides subcommands for running one poll cycle against the pGuide
//! service, transforming a published batch, and issuing single raw calls.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use famas_parking::{
    collector::{StationAggregator, run_cycle},
    config::{self, CollectorArgs, CollectorConfig, ENV_RPC_URL},
    fetch::BasicClient,
    fetch::DEFAULT_CONNECT_TIMEOUT,
    output::{append_records, write_stations},
    publish::{Publisher, S3Publisher, SpoolPublisher, read_batch},
    transform::{ReferenceTable, Transformer, occupied_data_type},
    xmlrpc::{RpcClient, Value},
};
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "famas_parking")]
#[command(about = "Collects parking occupancy from the FAMAS pGuide service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one poll cycle and publish the raw batch
    Collect(CollectCommand),
    /// Transform a published batch into readings and station descriptors
    Transform {
        /// Batch file written by `collect` (JSON, optionally gzip-compressed)
        #[arg(short, long)]
        batch: String,

        /// Curated station reference table
        #[arg(short, long, default_value = "stations.csv")]
        stations: String,

        /// CSV file to append readings to
        #[arg(long, default_value = "records.csv")]
        records_csv: String,

        /// JSON file receiving the station sync document
        #[arg(long, default_value = "stations.json")]
        stations_json: String,

        /// Origin tag for station descriptors (falls back to BDP_ORIGIN)
        #[arg(long)]
        origin: Option<String>,
    },
    /// Issue a single XML-RPC call and log the decoded result as JSON
    Call {
        /// Service endpoint (falls back to RPC_URL)
        #[arg(long)]
        rpc_url: Option<String>,

        /// Remote method name, e.g. pGuide.getElencoIdentificativiParcheggi
        method: String,

        /// Integer parameters, in order
        #[arg(value_name = "INT_PARAM", allow_negative_numbers = true)]
        params: Vec<i32>,
    },
}

#[derive(Args)]
struct CollectCommand {
    /// Service endpoint (falls back to RPC_URL)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Provider tag stamped on the batch (falls back to PROVIDER)
    #[arg(long)]
    provider: Option<String>,

    /// Directory receiving batch files when no bucket is given (falls back to SPOOL_DIR)
    #[arg(long)]
    spool_dir: Option<String>,

    /// Gzip compress the published batch
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// Optional: S3 bucket to publish to instead of the spool dir (falls back to S3_BUCKET)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long, default_value = "")]
    s3_prefix: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Upper bound for a whole poll cycle in seconds
    #[arg(long, default_value_t = 600)]
    cycle_timeout_secs: u64,
}

impl From<CollectCommand> for CollectorArgs {
    fn from(cmd: CollectCommand) -> Self {
        CollectorArgs {
            rpc_url: cmd.rpc_url,
            provider: cmd.provider,
            spool_dir: cmd.spool_dir,
            s3_bucket: cmd.s3_bucket,
            s3_prefix: cmd.s3_prefix,
            gzip: cmd.gzip,
            timeout_secs: cmd.timeout_secs,
            cycle_timeout_secs: cmd.cycle_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/famas_parking.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("famas_parking.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect(cmd) => {
            let config = CollectorConfig::from_env(cmd.into())?;
            collect(config).await?;
        }
        Commands::Transform {
            batch,
            stations,
            records_csv,
            stations_json,
            origin,
        } => {
            let reference = ReferenceTable::load(&stations)?;
            info!(stations = reference.len(), path = %stations, "Reference table loaded");

            let batch = read_batch(&batch)?;
            let transformer = Transformer::new(&reference, config::origin(origin));
            let output = transformer.transform(&batch.rawdata);

            append_records(&records_csv, &output.records)?;
            write_stations(&stations_json, &output.stations, &[occupied_data_type()])?;

            info!(
                provider = %batch.provider,
                stations = output.stations.len(),
                records = output.records.len(),
                skipped = output.skipped,
                "Batch transformed"
            );
        }
        Commands::Call {
            rpc_url,
            method,
            params,
        } => {
            let url = rpc_url
                .or_else(|| std::env::var(ENV_RPC_URL).ok())
                .with_context(|| format!("missing endpoint: pass --rpc-url or set {ENV_RPC_URL}"))?;
            let client = RpcClient::new(BasicClient::new()?, &url)?;
            let params = params.into_iter().map(Value::Int).collect();

            let value = client.call(&method, params).await?;
            info!(method = %method, "{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// Runs one poll cycle and publishes to S3 or to the spool directory.
#[tracing::instrument(skip_all, fields(endpoint = %config.rpc_url, provider = %config.provider))]
async fn collect(config: CollectorConfig) -> Result<()> {
    let http = BasicClient::with_timeouts(config.request_timeout, DEFAULT_CONNECT_TIMEOUT)?;
    let client = RpcClient::new(http, &config.rpc_url)?;
    let aggregator = StationAggregator::new(client);

    let publisher: Box<dyn Publisher> = match &config.s3_bucket {
        Some(bucket) => {
            info!(bucket = %bucket, gzip = config.gzip, "S3 publishing enabled");
            let aws = aws_config::load_from_env().await;
            Box::new(S3Publisher::new(
                aws_sdk_s3::Client::new(&aws),
                bucket.clone(),
                config.s3_prefix.clone(),
                config.gzip,
            ))
        }
        None => Box::new(SpoolPublisher::new(&config.spool_dir, config.gzip)),
    };

    let pushed = run_cycle(
        &aggregator,
        publisher.as_ref(),
        &config.provider,
        config.cycle_timeout,
    )
    .await?;

    info!(records_pushed = pushed, "Collection finished");
    Ok(())
}
