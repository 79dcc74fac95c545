//! Viewer sync entry point
//!
//! Mirrors remote event logs into a local directory, launches the metrics
//! viewer over that directory, and supervises it until it serves metrics,
//! times out, or exits.

use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fetcher::Fetcher;
use supervisor::{launch_args, HttpMetricsProbe, SessionOutcome, SyncSupervisor, ViewerProcess};
use sync_core::{Error, Result, SupervisorConfig};

/// Exit status for configuration failures, raised before any subprocess
const EXIT_CONFIG: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "viewer-sync",
    about = "Mirror remote event logs and supervise the metrics viewer"
)]
struct Args {
    /// Viewer release the launch flags target, e.g. "2.5.0"
    viewer_version: String,

    /// Comma-separated remote path prefixes to mirror
    paths: String,

    /// Arguments passed through to the viewer
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    viewer_args: Vec<String>,

    /// Experiment configuration file carrying the storage mapping
    #[arg(
        long,
        env = "VIEWER_SYNC_CONFIG",
        default_value = "/run/viewer/experiment_config.json"
    )]
    config: PathBuf,

    /// Viewer executable
    #[arg(long, env = "VIEWER_BIN", default_value = "tensorboard")]
    viewer_bin: String,

    /// Port the viewer serves on
    #[arg(long, env = "VIEWER_PORT")]
    port: u16,

    /// Task id used in the proxy path prefix
    #[arg(long, env = "VIEWER_TASK_ID")]
    task_id: String,

    /// Mirror directory; a per-task temp directory by default
    #[arg(long, env = "VIEWER_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// Seconds to wait for metrics before giving up
    #[arg(long, default_value_t = 600)]
    max_wait_secs: u64,

    /// Seconds between poll cycles
    #[arg(long, default_value_t = 1)]
    poll_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "viewer_sync=info,supervisor=info,fetcher=info,storage=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(outcome) => exit(outcome.exit_status()),
        Err(e) => {
            tracing::error!(error = %e, "viewer-sync failed");
            exit(match e {
                Error::InvalidConfig { .. } => EXIT_CONFIG,
                _ => 1,
            });
        }
    }
}

async fn run(args: Args) -> Result<SessionOutcome> {
    let raw = tokio::fs::read(&args.config).await?;
    let config_value: serde_json::Value = serde_json::from_slice(&raw)?;
    let storage_value =
        config_value
            .get("checkpoint_storage")
            .ok_or_else(|| Error::InvalidConfig {
                message: format!("{:?} has no 'checkpoint_storage' section", args.config),
            })?;

    let paths: Vec<String> = args
        .paths
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let local_root = args.local_root.clone().unwrap_or_else(|| {
        std::env::temp_dir().join(format!("viewer-events-{}", args.task_id))
    });

    let mut fetcher = Fetcher::build(storage_value, paths, &local_root).await?;
    fetcher.fetch_new().await?;

    let supervisor_config = SupervisorConfig {
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        max_wait: Duration::from_secs(args.max_wait_secs),
        ..Default::default()
    };

    let path_prefix = format!("/proxy/{}", args.task_id);
    let metrics_url = format!(
        "http://localhost:{}{}/data/plugin/scalars/tags",
        args.port, path_prefix
    );
    let probe = HttpMetricsProbe::new(metrics_url, supervisor_config.request_timeout)?;

    let viewer_args = launch_args(
        &args.viewer_version,
        args.port,
        &path_prefix,
        &local_root,
        &args.viewer_args,
    )?;
    let viewer = ViewerProcess::spawn(&args.viewer_bin, &viewer_args)?;

    let mut supervisor = SyncSupervisor::new(fetcher, Box::new(probe), supervisor_config);
    supervisor.run(viewer).await
}
