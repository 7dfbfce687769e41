//! Transport between the main context and the worker process.
//!
//! Each direction is an unbounded channel, so sends never block and messages
//! from one sender arrive in order. The main context side is a
//! [`WorkerHandle`]; the worker side is a [`WorkerScope`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};
use uuid::Uuid;

use thumbgen_core::protocol::{Envelope, Message};

use crate::worker::WorkerStatus;

/// Receive handler registered on the main context side.
pub type Listener = Arc<dyn Fn(Envelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// The worker's ends of the bridge.
pub struct WorkerScope {
    inbox: mpsc::UnboundedReceiver<Envelope>,
    outbox: mpsc::UnboundedSender<Envelope>,
    status: watch::Sender<WorkerStatus>,
}

impl WorkerScope {
    /// Next envelope from the main context; `None` once the handle is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inbox.recv().await
    }

    pub fn post(&self, envelope: Envelope) {
        // The main context may have gone away; nobody is left to tell.
        let _ = self.outbox.send(envelope);
    }

    pub fn post_message(&self, message: Message) {
        self.post(message.into_envelope());
    }

    pub fn publish_status(&self, status: WorkerStatus) {
        self.status.send_replace(status);
    }
}

/// Handle to the running worker process. Clones share the same worker.
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    to_worker: mpsc::UnboundedSender<Envelope>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    terminated: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    status: watch::Receiver<WorkerStatus>,
}

impl WorkerHandle {
    /// Start `body` as the worker process. Must be called inside a tokio
    /// runtime.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(WorkerScope) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (to_worker, inbox) = mpsc::unbounded_channel();
        let (outbox, mut from_worker) = mpsc::unbounded_channel::<Envelope>();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::default());

        let inner = Arc::new(Inner {
            to_worker,
            listeners: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            status: status_rx,
        });

        let worker = tokio::spawn(body(WorkerScope {
            inbox,
            outbox,
            status: status_tx,
        }));

        let weak = Arc::downgrade(&inner);
        let dispatcher = tokio::spawn(async move {
            while let Some(envelope) = from_worker.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.deliver(envelope);
            }
        });

        lock(&inner.tasks).extend([worker, dispatcher]);
        Self { inner }
    }

    /// Fire-and-forget send to the worker. Silently dropped once terminated.
    pub fn post(&self, envelope: Envelope) {
        if self.is_terminated() {
            trace!(task = ?envelope.task(), "dropping message to terminated worker");
            return;
        }
        let _ = self.inner.to_worker.send(envelope);
    }

    pub fn post_message(&self, message: Message) {
        self.post(message.into_envelope());
    }

    /// Register a receive handler. With more than one registered, every
    /// envelope but the last delivery is cloned, transfer buffers included.
    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        let mut listeners = lock(&self.inner.listeners);
        listeners.push((id, listener));
        if listeners.len() > 1 {
            warn!(
                listeners = listeners.len(),
                "several bridge listeners registered, transferred buffers will be copied"
            );
        }
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Stop the worker for good. Later posts are dropped and nothing the
    /// worker still had queued reaches the listeners.
    pub fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
        info!("worker process terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Progress published by the worker.
    pub fn status(&self) -> watch::Receiver<WorkerStatus> {
        self.inner.status.clone()
    }
}

impl Inner {
    fn deliver(&self, envelope: Envelope) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        // Call outside the lock so listeners may (de)register themselves.
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        let Some((last, rest)) = listeners.split_last() else {
            trace!(task = ?envelope.task(), "no listener registered, message dropped");
            return;
        };
        for listener in rest {
            listener(envelope.clone());
        }
        last(envelope);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
