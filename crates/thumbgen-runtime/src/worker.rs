//! The worker process: owns the queue of videos missing a thumbnail, asks the
//! main context for their first frames and hands the frames to a sink.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use thumbgen_core::locator::CONTAINER_EXTENSION;
use thumbgen_core::protocol::{Decoded, Message};
use thumbgen_core::task::{FrameResult, Toast, VideoTask};

use crate::bridge::{WorkerHandle, WorkerScope};
use crate::error::{Result, RuntimeError};

const THUMBNAIL_EXTENSION: &str = "jpg";
const SUMMARY_TOAST_DURATION: Duration = Duration::from_secs(4);

/// Reports which videos still lack a thumbnail.
#[async_trait]
pub trait PendingSource: Send + Sync {
    async fn fetch_pending(&self) -> Result<Vec<String>>;
}

/// Persists a captured frame as the video's thumbnail.
#[async_trait]
pub trait ThumbnailSink: Send + Sync {
    async fn upload(&self, frame: FrameResult) -> Result<()>;
}

/// A fixed list of ids.
#[derive(Debug, Clone, Default)]
pub struct StaticPending {
    ids: Vec<String>,
}

impl StaticPending {
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PendingSource for StaticPending {
    async fn fetch_pending(&self) -> Result<Vec<String>> {
        Ok(self.ids.clone())
    }
}

/// Every `<id>.mp4` in a video directory that has no `<id>.jpg` in the
/// thumbnail directory.
#[derive(Debug, Clone)]
pub struct DirectoryScan {
    videos: PathBuf,
    thumbnails: PathBuf,
}

impl DirectoryScan {
    pub fn new(videos: impl Into<PathBuf>, thumbnails: impl Into<PathBuf>) -> Self {
        Self {
            videos: videos.into(),
            thumbnails: thumbnails.into(),
        }
    }
}

#[async_trait]
impl PendingSource for DirectoryScan {
    async fn fetch_pending(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.videos)
            .await
            .map_err(|_| RuntimeError::UnscannableSource(self.videos.display().to_string()))?;

        let mut pending = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CONTAINER_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let thumbnail = self.thumbnails.join(format!("{id}.{THUMBNAIL_EXTENSION}"));
            if !tokio::fs::try_exists(&thumbnail).await? {
                pending.push(id.to_string());
            }
        }
        pending.sort();
        Ok(pending)
    }
}

/// Writes `<id>.jpg` into a directory. The file appears atomically.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        let mut components = Path::new(id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {
                Ok(self.dir.join(format!("{id}.{THUMBNAIL_EXTENSION}")))
            }
            _ => Err(RuntimeError::InvalidVideoId(id.to_string())),
        }
    }
}

#[async_trait]
impl ThumbnailSink for DirectorySink {
    async fn upload(&self, frame: FrameResult) -> Result<()> {
        let path = self.path_for(frame.id())?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let (id, payload) = frame.into_parts();
        let partial = path.with_extension(format!("{THUMBNAIL_EXTENSION}.part"));
        tokio::fs::write(&partial, &payload).await?;
        tokio::fs::rename(&partial, &path).await?;
        debug!(%id, bytes = payload.len(), path = %path.display(), "thumbnail stored");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    /// Whether a pending list has been fetched at least once.
    pub fetched: bool,
    /// Frames requested but not received yet.
    pub outstanding: usize,
    pub uploaded: usize,
    pub failed: usize,
}

impl WorkerStatus {
    /// A list was fetched and every requested frame has come back.
    pub fn is_drained(&self) -> bool {
        self.fetched && self.outstanding == 0
    }
}

/// Factory for [`crate::registry::WorkerRegistry`] that starts the thumbnail
/// worker with the given collaborators.
pub fn thumbnail_worker(
    source: Arc<dyn PendingSource>,
    sink: Arc<dyn ThumbnailSink>,
) -> impl Fn() -> WorkerHandle + Send + Sync + 'static {
    move || {
        let (source, sink) = (source.clone(), sink.clone());
        WorkerHandle::spawn(move |scope| run_worker(scope, source, sink))
    }
}

/// Worker main loop. Runs until the main context drops its handle or the
/// worker is terminated.
pub async fn run_worker(
    mut scope: WorkerScope,
    source: Arc<dyn PendingSource>,
    sink: Arc<dyn ThumbnailSink>,
) {
    let mut outstanding: HashSet<String> = HashSet::new();
    let mut status = WorkerStatus::default();
    let mut batch_uploaded = 0usize;

    while let Some(envelope) = scope.recv().await {
        match envelope.decode() {
            Decoded::Message(Message::FetchList) => {
                match source.fetch_pending().await {
                    Ok(ids) => {
                        // Each fetch starts a new batch; ids left over from an
                        // earlier one are requested again.
                        outstanding.clear();
                        for id in ids {
                            if VideoTask::new(id.as_str()).is_err() || !outstanding.insert(id.clone()) {
                                continue;
                            }
                            scope.post_message(Message::GetFirstFrame(id));
                        }
                        info!(queued = outstanding.len(), "pending list fetched");
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to fetch pending list");
                        scope.post_message(Message::AddToast(Toast::new(
                            format!("Could not load videos missing a thumbnail: {e}"),
                            "error",
                        )));
                    }
                }
                status.fetched = true;
            }
            Decoded::Message(Message::SetFrame(frame)) => {
                let id = frame.id().to_string();
                if !outstanding.remove(&id) {
                    debug!(%id, "received a frame that was not requested");
                }
                match sink.upload(frame).await {
                    Ok(()) => {
                        status.uploaded += 1;
                        batch_uploaded += 1;
                    }
                    Err(e) => {
                        status.failed += 1;
                        warn!(%id, error = %e, "thumbnail upload failed");
                        scope.post_message(Message::AddToast(Toast::new(
                            format!("Thumbnail for {id} could not be saved: {e}"),
                            "error",
                        )));
                    }
                }
                summarise_if_drained(&scope, &outstanding, &mut batch_uploaded);
            }
            Decoded::Message(Message::AbandonFrame(id)) => {
                if outstanding.remove(&id) {
                    status.failed += 1;
                    debug!(%id, "capture abandoned by the main context");
                    summarise_if_drained(&scope, &outstanding, &mut batch_uploaded);
                }
            }
            Decoded::Message(other) => {
                trace!(task = other.tag(), "ignoring message meant for the main context");
            }
            Decoded::Unknown(task) => trace!(%task, "ignoring unknown task"),
            Decoded::Malformed => trace!("ignoring malformed message"),
        }

        status.outstanding = outstanding.len();
        scope.publish_status(status);
    }

    debug!("worker inbox closed");
}

fn summarise_if_drained(scope: &WorkerScope, outstanding: &HashSet<String>, batch_uploaded: &mut usize) {
    if outstanding.is_empty() && *batch_uploaded > 0 {
        scope.post_message(Message::AddToast(
            Toast::new(format!("Generated {batch_uploaded} video thumbnail(s)"), "success")
                .with_duration(SUMMARY_TOAST_DURATION),
        ));
        *batch_uploaded = 0;
    }
}
