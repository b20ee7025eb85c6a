use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use vpc_replay::supervisor::{run_master, ReplayOptions};
use vpc_replay::worker::{run_worker, WorkerOptions};
use vpc_replay::JsonDatabase;

mod config;
mod warm;

use config::ReplayToolConfig;
use warm::CacheWarmCreator;

/// Replays captured pipeline state against the driver to prepopulate its
/// shader and pipeline caches. Master mode fans the workload out across
/// crash-isolated worker processes; `--slave-process` is the worker side
/// and is normally spawned by the master itself.
#[derive(Parser)]
#[command(name = "vpcreplay")]
#[command(about = "Replay captured Vulkan pipeline state to warm driver caches")]
#[command(version)]
struct Cli {
    /// Serialized state database(s) to replay, in order
    #[arg(required = true, value_name = "DATABASE")]
    databases: Vec<PathBuf>,

    /// Number of worker processes (master mode)
    #[arg(long, value_name = "N")]
    num_threads: Option<u32>,

    /// Run as a replay worker on the given ranges
    #[arg(long)]
    slave_process: bool,

    /// Graphics pipelines to replay: start (inclusive) and end (exclusive)
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    graphics_pipeline_range: Option<Vec<u32>>,

    /// Compute pipelines to replay: start (inclusive) and end (exclusive)
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    compute_pipeline_range: Option<Vec<u32>>,

    /// Shared-memory control block to publish telemetry into
    #[arg(long, value_name = "NAME")]
    shm_name: Option<String>,

    /// Named mutex guarding the control block's ring buffer
    #[arg(long, value_name = "NAME")]
    shm_mutex_name: Option<String>,

    /// Persist created pipeline hashes to this file
    #[arg(long, value_name = "PATH")]
    on_disk_pipeline_cache: Option<PathBuf>,

    /// Deduplicate pipelines against an in-memory cache during replay
    #[arg(long)]
    pipeline_cache: bool,

    /// Validate the SPIR-V magic word before creating modules
    #[arg(long)]
    spirv_val: bool,

    /// Silence worker stderr
    #[arg(long)]
    quiet_slave: bool,

    /// Configuration file with defaults for the flags above
    #[arg(long, default_value = "vpc.toml")]
    config: String,
}

/// stdout belongs to the worker protocol, so logs go to stderr.
/// VPC_LOG=debug (or trace, warn, error) controls verbosity.
fn init_logging() {
    let filter = EnvFilter::try_from_env("VPC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn range(values: &Option<Vec<u32>>) -> (u32, u32) {
    match values.as_deref() {
        Some([start, end]) => (*start, *end),
        _ => (0, u32::MAX),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = ReplayToolConfig::load_or_default(&cli.config);

    let spirv_validate = cli.spirv_val || config.spirv_val.unwrap_or(false);
    let pipeline_cache = cli.pipeline_cache || config.pipeline_cache.unwrap_or(false);
    let on_disk_pipeline_cache = cli
        .on_disk_pipeline_cache
        .clone()
        .or_else(|| config.on_disk_pipeline_cache.as_deref().map(PathBuf::from));

    if cli.slave_process {
        let options = WorkerOptions {
            databases: cli.databases.clone(),
            graphics_range: range(&cli.graphics_pipeline_range),
            compute_range: range(&cli.compute_pipeline_range),
        };
        let creator = CacheWarmCreator::new(spirv_validate, pipeline_cache, on_disk_pipeline_cache);
        let code = run_worker(creator, &options).context("worker replay failed")?;
        std::process::exit(code);
    }

    let options = ReplayOptions {
        num_workers: cli.num_threads.or(config.num_threads).unwrap_or(1),
        databases: cli.databases.clone(),
        worker_binary: None,
        shm_name: cli.shm_name.clone(),
        shm_mutex_name: cli.shm_mutex_name.clone(),
        on_disk_pipeline_cache,
        pipeline_cache,
        spirv_validate,
        quiet_slave: cli.quiet_slave || config.quiet_slave.unwrap_or(false),
        crash_grace: Duration::from_secs(1),
    };

    let mut database = JsonDatabase::new(cli.databases);
    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime
        .block_on(run_master(&mut database, &options))
        .context("replay supervision failed")?;

    info!(
        clean_deaths = summary.clean_process_deaths,
        dirty_deaths = summary.dirty_process_deaths,
        banned_modules = summary.banned_modules,
        "replay finished"
    );
    Ok(())
}
