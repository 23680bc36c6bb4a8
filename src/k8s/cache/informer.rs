use super::config::ReflectorConfig;
use super::dispatcher::{EventDispatcher, EventHandler};
use super::object::{ObjectKey, ResourceObject};
use super::reflector::{Reflector, ReflectorStats};
use super::store::Store;
use super::sync::{self, SyncBarrier, SyncNotifier};
use crate::error::{Error, Result};
use crate::k8s::source::RemoteSource;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Local mirror of the pods in one namespace
///
/// Register handlers with [`subscribe`](Self::subscribe), then
/// [`start`](Self::start) the reflector and gate all reads on
/// [`wait_for_sync`](Self::wait_for_sync).
pub struct PodInformer<S> {
    source: Option<S>,
    config: ReflectorConfig,
    store: Arc<Store>,
    handlers: Vec<Box<dyn EventHandler>>,
    notifier: Option<SyncNotifier>,
    barrier: SyncBarrier,
    stats: Arc<RwLock<ReflectorStats>>,
}

impl<S: RemoteSource + 'static> PodInformer<S> {
    #[must_use]
    pub fn new(source: S, config: ReflectorConfig) -> Self {
        let (notifier, barrier) = sync::barrier();
        Self {
            source: Some(source),
            config,
            store: Arc::new(Store::new()),
            handlers: Vec::new(),
            notifier: Some(notifier),
            barrier,
            stats: Arc::new(RwLock::new(ReflectorStats::default())),
        }
    }

    /// Register a handler; handlers are fixed once the informer starts
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyStarted` after [`start`](Self::start).
    pub fn subscribe(&mut self, handler: impl EventHandler + 'static) -> Result<()> {
        if self.source.is_none() {
            return Err(Error::AlreadyStarted("pod informer"));
        }
        self.handlers.push(Box::new(handler));
        Ok(())
    }

    /// Spawn the reflector task
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyStarted` when called more than once.
    pub fn start(&mut self, cancel: CancellationToken) -> Result<ReflectorHandle> {
        let (Some(source), Some(notifier)) = (self.source.take(), self.notifier.take()) else {
            return Err(Error::AlreadyStarted("pod informer"));
        };

        let dispatcher = EventDispatcher::new(std::mem::take(&mut self.handlers));
        let reflector = Reflector::new(
            source,
            self.config.clone(),
            self.store.clone(),
            dispatcher,
            notifier,
            self.stats.clone(),
        );

        info!("🚀 Pod informer starting for namespace {}", self.config.namespace);
        let task = tokio::spawn(reflector.run(cancel));
        Ok(ReflectorHandle { task })
    }
}

impl<S> PodInformer<S> {
    /// See [`SyncBarrier::wait_for_sync`]
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> bool {
        self.barrier.wait_for_sync(cancel).await
    }

    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.barrier.has_synced()
    }

    /// Point-in-time copy of the mirrored pods, ordered by key
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceObject> {
        self.store.snapshot()
    }

    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<ResourceObject> {
        self.store.get(key)
    }

    #[must_use]
    pub fn stats(&self) -> ReflectorStats {
        self.stats
            .read()
            .map_or_else(|_| ReflectorStats::default(), |stats| stats.clone())
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }
}

/// Handle to the spawned reflector task
pub struct ReflectorHandle {
    task: JoinHandle<Result<()>>,
}

impl ReflectorHandle {
    /// Wait for the reflector to stop and return its outcome
    ///
    /// # Errors
    ///
    /// Returns the reflector's error, or `Error::Join` if the task panicked or was aborted.
    pub async fn join(self) -> Result<()> {
        self.task.await?
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
