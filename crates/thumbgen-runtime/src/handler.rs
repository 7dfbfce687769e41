//! Main context side of the bridge: reacts to what the worker asks for.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, trace, warn};

use thumbgen_core::protocol::{Decoded, Envelope, Message};
use thumbgen_core::task::Toast;
use thumbgen_media::capture::CaptureFirstFrame;

use crate::bridge::WorkerHandle;

/// Shows notifications relayed by the worker.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: &Toast);
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, toast: &Toast) {
        info!(category = %toast.category, duration = ?toast.duration, "{}", toast.message);
    }
}

/// Dispatches worker messages for one mount.
pub struct BridgeHandler {
    worker: WorkerHandle,
    capturer: Arc<dyn CaptureFirstFrame>,
    notifier: Arc<dyn Notifier>,
    limiter: Option<Arc<Semaphore>>,
    captures: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl BridgeHandler {
    pub fn new(
        worker: WorkerHandle,
        capturer: Arc<dyn CaptureFirstFrame>,
        notifier: Arc<dyn Notifier>,
        max_concurrent_captures: Option<usize>,
        runtime: Handle,
    ) -> Self {
        Self {
            worker,
            capturer,
            notifier,
            limiter: max_concurrent_captures.map(|n| Arc::new(Semaphore::new(n))),
            captures: Mutex::new(JoinSet::new()),
            runtime,
        }
    }

    pub fn handle(&self, envelope: Envelope) {
        match envelope.decode() {
            Decoded::Message(Message::GetFirstFrame(id)) => self.spawn_capture(id),
            Decoded::Message(Message::AddToast(toast)) => self.notifier.notify(&toast),
            Decoded::Message(other) => {
                trace!(task = other.tag(), "ignoring message meant for the worker");
            }
            Decoded::Unknown(task) => trace!(%task, "ignoring unknown task"),
            Decoded::Malformed => trace!("ignoring malformed message"),
        }
    }

    /// Captures started by this handler that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut captures = self.captures();
        while captures.try_join_next().is_some() {}
        captures.len()
    }

    /// Drop every capture still running. Their surfaces are released.
    pub fn abort_captures(&self) {
        self.captures().abort_all();
    }

    fn spawn_capture(&self, id: String) {
        let worker = self.worker.clone();
        let capturer = self.capturer.clone();
        let limiter = self.limiter.clone();

        let mut captures = self.captures();
        while captures.try_join_next().is_some() {}
        captures.spawn_on(
            async move {
                let _permit = match limiter {
                    Some(limiter) => match limiter.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };

                let outcome = capturer.capture_first_frame(&id).await;
                match outcome {
                    Ok(frame) => worker.post_message(Message::SetFrame(frame)),
                    Err(e) if e.is_fatal() => {
                        error!(
                            %id,
                            error = %e,
                            "generating video thumbnails is not supported here, terminating the worker"
                        );
                        worker.terminate();
                    }
                    Err(e) => {
                        warn!(%id, error = %e, "thumbnail capture abandoned");
                        worker.post_message(Message::AbandonFrame(id));
                    }
                }
            },
            &self.runtime,
        );
    }

    fn captures(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.captures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
