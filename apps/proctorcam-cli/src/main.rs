use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use proctorcam_camera::{CameraSource, Pattern, StillImageCamera, SyntheticCamera};
use proctorcam_ops::{forward_signals, init_tracing, TelemetryStore};
use proctorcam_orchestrator::Orchestrator;
use proctorcam_reporting::{EventReporter, HttpReporter, RecordingReporter};
use proctorcam_storage::{store_from_config, MemoryStore, ObjectStore};
use proctorcam_types::{
    config::{
        CameraConfig, CaptureConfig, OpsConfig, ProctorcamConfig, ReportingConfig, SessionConfig,
        StorageBackend, StorageConfig,
    },
    snapshot::DEFAULT_SNAPSHOT_PREFIX,
};
use tokio::{
    io::BufReader,
    sync::mpsc,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "proctorcam", about = "Secondary camera snapshot capture for proctored tests")]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(env = "PROCTORCAM_CONFIG", default_value = "configs/dev.toml")]
    config: String,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Keep uploads and events in memory instead of calling the backend.
    #[arg(long)]
    dry_run: bool,
    /// Ignore battery/visibility signals on stdin (one JSON object per line).
    #[arg(long)]
    no_device_signals: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    init_tracing(&config.ops)?;

    match config.camera.still_image.clone() {
        Some(path) => run(config, StillImageCamera::new(path), &cli).await,
        None => run(config, SyntheticCamera::new(1280, 720, Pattern::Gradient), &cli).await,
    }
}

async fn run<C: CameraSource>(config: ProctorcamConfig, source: C, cli: &Cli) -> Result<()> {
    let timeout_ms = config.reporting.request_timeout_ms;
    let (store, reporter): (Arc<dyn ObjectStore>, Arc<dyn EventReporter>) = if cli.dry_run {
        info!("Dry run: snapshots and events stay in memory");
        (
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingReporter::default()),
        )
    } else {
        (
            store_from_config(&config.storage, timeout_ms)?,
            Arc::new(HttpReporter::new(&config.reporting.base_url, timeout_ms)?),
        )
    };

    let mut orchestrator = Orchestrator::new(
        config,
        source,
        store,
        reporter,
        TelemetryStore::new(),
    );

    orchestrator.boot().await?;
    if let Err(err) = orchestrator.confirm_setup().await {
        warn!("{}", err.user_message());
        orchestrator.shutdown().await?;
        return Err(err.into());
    }

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let duration = cli.duration_secs;
    tokio::spawn(async move {
        match duration {
            Some(secs) => sleep(Duration::from_secs(secs)).await,
            None => {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("Unable to listen for Ctrl-C: {err}");
                    return;
                }
            }
        }
        info!("Stopping capture");
        stopper.cancel();
    });

    let signals = if cli.no_device_signals {
        None
    } else {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            if let Err(err) = forward_signals(BufReader::new(tokio::io::stdin()), tx).await {
                warn!("Device signal input stopped: {err}");
            }
        });
        Some(rx)
    };

    orchestrator.run(cancel, signals).await?;
    orchestrator.shutdown().await?;
    Ok(())
}

fn load_config(path: &str) -> ProctorcamConfig {
    match ProctorcamConfig::from_file(path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            default_config()
        }
    }
}

fn default_config() -> ProctorcamConfig {
    let config = ProctorcamConfig {
        session: SessionConfig {
            test_id: "local-test".into(),
            test_session_id: "local-session".into(),
            token: "local-token".into(),
            device_fingerprint: None,
        },
        camera: CameraConfig::default(),
        capture: CaptureConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::LocalDir,
            region: "ap-south-1".into(),
            bucket: "ib-assessment-tests".into(),
            mode: "development".into(),
            endpoint: "snapshots".into(),
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.into(),
        },
        reporting: ReportingConfig {
            base_url: "http://127.0.0.1:3000".into(),
            request_timeout_ms: 10_000,
        },
        ops: OpsConfig {
            log_level: "info".into(),
            battery_low_threshold: 0.2,
        },
    };
    debug_assert!(config.validate().is_ok());
    config
}
