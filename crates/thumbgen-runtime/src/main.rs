use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use thumbgen_media::capture::FrameCapturer;
use thumbgen_media::decoder::FfmpegDecoder;
use thumbgen_media::surface::Stage;
use thumbgen_runtime::config::GeneratorConfig;
use thumbgen_runtime::lifecycle::ThumbnailGenerator;
use thumbgen_runtime::registry::WorkerRegistry;
use thumbgen_runtime::worker::{
    DirectoryScan, DirectorySink, PendingSource, StaticPending, WorkerStatus, thumbnail_worker,
};

/// Generate first-frame JPEG thumbnails for videos that lack one.
#[derive(Debug, Parser)]
#[command(name = "thumbgen", version)]
struct Cli {
    /// JSON configuration file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory or URL prefix serving `<id>.mp4`.
    #[arg(long)]
    origin: Option<String>,

    /// Output directory for `<id>.jpg`.
    #[arg(long)]
    thumbnails: Option<PathBuf>,

    /// Abandon a video that does not load or seek within this many ms.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Give up waiting for the batch after this many seconds.
    #[arg(long, default_value_t = 300)]
    wait_secs: u64,

    /// Video ids to process. Without any, the origin directory is scanned.
    ids: Vec<String>,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => GeneratorConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config.origin = origin.clone();
        }
        if let Some(dir) = &self.thumbnails {
            config.thumbnail_dir = dir.clone();
        }
        if self.timeout_ms.is_some() {
            config.signal_timeout_ms = self.timeout_ms;
        }
        if self.max_concurrent.is_some() {
            config.max_concurrent_captures = self.max_concurrent;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let source: Arc<dyn PendingSource> = if cli.ids.is_empty() {
        Arc::new(DirectoryScan::new(&config.origin, &config.thumbnail_dir))
    } else {
        Arc::new(StaticPending::new(cli.ids.iter().cloned()))
    };
    let sink = Arc::new(DirectorySink::new(&config.thumbnail_dir));

    let registry = Arc::new(WorkerRegistry::new(thumbnail_worker(source, sink)));
    let capturer = FrameCapturer::<FfmpegDecoder>::new(config.origin.clone(), Stage::new())
        .with_options(config.capture_options());
    let generator = ThumbnailGenerator::new(registry, Arc::new(capturer))
        .with_capture_limit(config.max_concurrent_captures);

    let mount = generator.mount();
    let Some(worker) = mount.worker().cloned() else {
        bail!("thumbnail generator did not mount");
    };

    let mut status = worker.status();
    let waited = tokio::time::timeout(Duration::from_secs(cli.wait_secs), async {
        loop {
            if status.borrow_and_update().is_drained() || worker.is_terminated() {
                break;
            }
            if status.changed().await.is_err() {
                break;
            }
        }
    })
    .await;

    let WorkerStatus {
        outstanding,
        uploaded,
        failed,
        ..
    } = *status.borrow();
    if waited.is_err() {
        warn!(outstanding, "gave up waiting for the remaining videos");
    }
    info!(uploaded, failed, outstanding, "thumbnail run finished");
    mount.unmount();

    if worker.is_terminated() {
        bail!("thumbnail generation is not supported in this environment");
    }
    Ok(())
}
