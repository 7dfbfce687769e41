use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::bridge::WorkerHandle;

type WorkerFactory = Box<dyn Fn() -> WorkerHandle + Send + Sync>;

/// Holds the one worker process shared by every mount.
///
/// The worker is started on first use and never replaced, not even after it
/// was terminated: a terminated worker stays terminated for the lifetime of
/// the registry.
pub struct WorkerRegistry {
    factory: WorkerFactory,
    handle: OnceLock<WorkerHandle>,
    spawned: AtomicUsize,
}

impl WorkerRegistry {
    pub fn new(factory: impl Fn() -> WorkerHandle + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            handle: OnceLock::new(),
            spawned: AtomicUsize::new(0),
        }
    }

    /// The shared worker, starting it if needed. Must be called inside a
    /// tokio runtime the first time.
    pub fn get_or_spawn(&self) -> WorkerHandle {
        self.handle
            .get_or_init(|| {
                self.spawned.fetch_add(1, Ordering::SeqCst);
                info!("starting worker process");
                (self.factory)()
            })
            .clone()
    }

    /// The worker, if it was ever started.
    pub fn current(&self) -> Option<WorkerHandle> {
        self.handle.get().cloned()
    }

    /// How many times the factory ran. Never more than one.
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn idle(mut scope: crate::bridge::WorkerScope) {
        while scope.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_spawns_once() {
        let registry = WorkerRegistry::new(|| WorkerHandle::spawn(idle));
        assert!(registry.current().is_none());

        let first = registry.get_or_spawn();
        let second = registry.get_or_spawn();
        assert_eq!(registry.spawn_count(), 1);

        first.add_listener(std::sync::Arc::new(|_: thumbgen_core::protocol::Envelope| {}));
        assert_eq!(second.listener_count(), 1, "handles must share one worker");
    }

    #[tokio::test]
    async fn test_terminated_worker_is_not_replaced() {
        let registry = WorkerRegistry::new(|| WorkerHandle::spawn(idle));
        registry.get_or_spawn().terminate();

        let again = registry.get_or_spawn();
        assert!(again.is_terminated());
        assert_eq!(registry.spawn_count(), 1);
    }
}
