//! Snapshot post-processor demo
//!
//! Runs the full pipeline on synthetic NV21 frames with the software JPEG
//! backend and writes the delivered pictures to a directory.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::{select, unbounded};
use snapshot_postproc::backend::SoftwareJpegBackend;
use snapshot_postproc::config::{default_config_path, default_save_dir, CaptureSettings};
use snapshot_postproc::metadata::MetadataValue;
use snapshot_postproc::{Dimension, MetadataTable, PostProcConfig, PostProcessor, SharedParameters};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod demo;

use demo::{DemoRegistry, FileSink, SinkEvent, SyntheticCamera};

const EXIF_MAKE: u32 = 0x010F;
const EXIF_DATE_TIME: u32 = 0x0132;

#[derive(Parser)]
#[command(name = "snapshot-postproc")]
#[command(about = "Run the snapshot post-processor on synthetic frames")]
#[command(version)]
struct Cli {
    /// Number of frames to capture
    #[arg(short, long, default_value = "4")]
    frames: u32,

    /// Frame width in pixels
    #[arg(long, default_value = "640")]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value = "480")]
    height: u32,

    /// Output directory (default: ~/Pictures/snapshot-postproc/run_TIMESTAMP)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (default: postproc.toml in the data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Send frames through the loopback reprocess channel
    #[arg(long)]
    reprocess: bool,

    /// Capture in longshot mode
    #[arg(long)]
    longshot: bool,

    /// JPEG rotation in degrees
    #[arg(long, default_value = "0")]
    rotation: u32,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().context("log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,snapshot_postproc=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn load_config(path: Option<PathBuf>) -> PostProcConfig {
    match path.or_else(default_config_path) {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {}", path.display());
            PostProcConfig::load_or_default(path)
        }
        _ => PostProcConfig::default(),
    }
}

fn exif_table() -> anyhow::Result<MetadataTable> {
    let mut table = MetadataTable::new();
    table.add(EXIF_MAKE, MetadataValue::ascii("snapshot-postproc")?)?;
    let now = chrono::Local::now().format("%Y:%m:%d %H:%M:%S").to_string();
    table.add(EXIF_DATE_TIME, MetadataValue::ascii(&now)?)?;
    Ok(table)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    tracing::info!("Starting snapshot post-processor demo");

    let out_dir = cli.output.clone().unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        default_save_dir().join(format!("run_{}", stamp))
    });
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Creating output directory {}", out_dir.display()))?;

    let mut config = load_config(cli.config.clone());
    config.save.directory = out_dir.join("saved");

    let params = Arc::new(SharedParameters::new(CaptureSettings {
        reprocess: cli.reprocess,
        longshot: cli.longshot,
        rotation: cli.rotation,
        ..Default::default()
    }));
    params.set_exif(Some(exif_table()?));

    let size = Dimension::new(cli.width, cli.height);
    let camera = Arc::new(SyntheticCamera::new(size));
    let (reprocessed_tx, reprocessed_rx) = unbounded();
    let registry = Arc::new(DemoRegistry::new(Arc::clone(&camera), reprocessed_tx));
    let (events_tx, events_rx) = unbounded();
    let sink = Arc::new(FileSink::new(out_dir.clone(), events_tx));

    let mut post = PostProcessor::new(
        config,
        params,
        registry,
        Arc::new(SoftwareJpegBackend::new()),
    );
    post.init(sink).context("Initializing post-processor")?;
    post.start(camera.clone()).context("Starting post-processor")?;

    for n in 0..cli.frames {
        post.submit_captured(camera.capture(n))?;
    }

    let (mut written, mut failed) = (0, 0);
    while written + failed < cli.frames {
        select! {
            recv(reprocessed_rx) -> output => {
                let output = output.context("reprocess channel closed")?;
                post.submit_reprocessed(output)?;
            }
            recv(events_rx) -> event => match event.context("sink closed")? {
                SinkEvent::Written(path) => {
                    tracing::info!("Picture written to {}", path.display());
                    written += 1;
                }
                SinkEvent::Failed(reason) => {
                    tracing::error!("Picture failed: {}", reason);
                    failed += 1;
                }
            },
            default(Duration::from_secs(30)) => bail!("timed out waiting for pictures"),
        }
    }

    post.stop()?;
    post.deinit();

    tracing::info!(
        "{} picture(s) written, {} failed, {} buffer(s) returned to the camera",
        written,
        failed,
        camera.returned()
    );
    println!("Output: {}", out_dir.display());
    Ok(())
}
