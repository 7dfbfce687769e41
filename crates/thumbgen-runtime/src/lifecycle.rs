//! Mounting the thumbnail generator into a host application.
//!
//! Every mount registers exactly one bridge listener and asks the worker for
//! the pending list. Unmounting removes that listener again; the worker
//! itself outlives mounts so a remount reuses it.

use std::mem;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use thumbgen_core::protocol::{Envelope, Message};
use thumbgen_media::capture::CaptureFirstFrame;

use crate::bridge::{ListenerId, WorkerHandle};
use crate::handler::{BridgeHandler, LogNotifier, Notifier};
use crate::registry::WorkerRegistry;

pub struct ThumbnailGenerator {
    registry: Arc<WorkerRegistry>,
    capturer: Arc<dyn CaptureFirstFrame>,
    notifier: Arc<dyn Notifier>,
    max_concurrent_captures: Option<usize>,
}

impl ThumbnailGenerator {
    pub fn new(registry: Arc<WorkerRegistry>, capturer: Arc<dyn CaptureFirstFrame>) -> Self {
        Self {
            registry,
            capturer,
            notifier: Arc::new(LogNotifier),
            max_concurrent_captures: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Cap the number of captures running at once. `None` leaves it to the
    /// worker how many frames it asks for.
    pub fn with_capture_limit(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_captures = limit;
        self
    }

    /// Mount the generator. Without a tokio runtime on the calling thread
    /// there is nowhere to run the worker, and the mount is inert.
    pub fn mount(&self) -> Mount {
        let Ok(runtime) = Handle::try_current() else {
            debug!("no async runtime available, thumbnail generation disabled");
            return Mount {
                state: MountState::Inert,
            };
        };

        let worker = self.registry.get_or_spawn();
        let handler = Arc::new(BridgeHandler::new(
            worker.clone(),
            self.capturer.clone(),
            self.notifier.clone(),
            self.max_concurrent_captures,
            runtime,
        ));
        let listener = {
            let handler = handler.clone();
            worker.add_listener(Arc::new(move |envelope: Envelope| handler.handle(envelope)))
        };
        worker.post_message(Message::FetchList);
        info!("thumbnail generator mounted");

        Mount {
            state: MountState::Mounted {
                worker,
                listener,
                handler,
            },
        }
    }
}

/// A live mount. Unmounts on drop.
pub struct Mount {
    state: MountState,
}

enum MountState {
    Inert,
    Mounted {
        worker: WorkerHandle,
        listener: ListenerId,
        handler: Arc<BridgeHandler>,
    },
    Unmounted,
}

impl Mount {
    pub fn is_mounted(&self) -> bool {
        matches!(self.state, MountState::Mounted { .. })
    }

    pub fn worker(&self) -> Option<&WorkerHandle> {
        match &self.state {
            MountState::Mounted { worker, .. } => Some(worker),
            _ => None,
        }
    }

    /// Captures started through this mount that are still running.
    pub fn captures_in_flight(&self) -> usize {
        match &self.state {
            MountState::Mounted { handler, .. } => handler.in_flight(),
            _ => 0,
        }
    }

    pub fn unmount(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let MountState::Mounted {
            worker,
            listener,
            handler,
        } = mem::replace(&mut self.state, MountState::Unmounted)
        {
            worker.remove_listener(listener);
            handler.abort_captures();
            debug!("thumbnail generator unmounted");
        }
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.release();
    }
}
