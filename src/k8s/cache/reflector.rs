/**
 * Pod reflector
 *
 * Lists the namespace once, then follows the watch stream from the listed
 * resourceVersion. Every change is applied to the store and dispatched in
 * the same order. A dropped stream is reopened from the last applied
 * version; an expired version triggers a full relist.
 */
use super::config::ReflectorConfig;
use super::dispatcher::{Dispatched, EventDispatcher};
use super::object::{ChangeEvent, DeletedFinalStateUnknown, DeletedPayload, ObjectKey, ResourceObject};
use super::store::Store;
use super::sync::SyncNotifier;
use crate::error::{Error, Result};
use crate::k8s::source::{Listing, MalformedPayload, Payload, RemoteSource, SourceError, WatchEvent, WatchStream};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchConnectionStatus {
    #[default]
    Disconnected,
    Listing,
    Connected,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct ReflectorStats {
    pub connection_status: WatchConnectionStatus,
    /// Last resourceVersion applied, the resume point for the next watch
    pub resource_version: Option<String>,
    pub lists: u64,
    pub relists: u64,
    pub watch_restarts: u64,
    pub events_applied: u64,
    pub malformed_events: u64,
    pub resyncs: u64,
    pub reconciled: u64,
}

/// How a single watch stream ended
enum StreamEnd {
    Cancelled,
    /// Clean EOF, typically the server-side timeout
    Closed,
    Expired(String),
    Dropped(SourceError),
}

pub struct Reflector<S> {
    source: S,
    config: ReflectorConfig,
    store: Arc<Store>,
    dispatcher: EventDispatcher,
    notifier: SyncNotifier,
    stats: Arc<RwLock<ReflectorStats>>,
    resource_version: String,
    failures: u32,
}

impl<S: RemoteSource> Reflector<S> {
    #[must_use]
    pub fn new(
        source: S,
        config: ReflectorConfig,
        store: Arc<Store>,
        dispatcher: EventDispatcher,
        notifier: SyncNotifier,
        stats: Arc<RwLock<ReflectorStats>>,
    ) -> Self {
        Self {
            source,
            config,
            store,
            dispatcher,
            notifier,
            stats,
            resource_version: String::new(),
            failures: 0,
        }
    }

    /// Drive list+watch until `cancel` fires or a fatal error occurs
    ///
    /// # Errors
    ///
    /// Returns `Error::InitialList` if the first list fails,
    /// `Error::Source` on an authentication failure and
    /// `Error::WatchRetriesExhausted` once the consecutive failure cap is hit.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("🔍 Starting pod reflector for namespace {}", self.config.namespace);

        let outcome = self.list_and_watch(&cancel).await;
        self.record(|stats| stats.connection_status = WatchConnectionStatus::Stopped);

        match &outcome {
            Ok(()) => info!("🛑 Pod reflector for {} stopped", self.config.namespace),
            Err(e) => error!("❌ Pod reflector for {} failed: {}", self.config.namespace, e),
        }
        outcome
    }

    async fn list_and_watch(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.record(|stats| stats.connection_status = WatchConnectionStatus::Listing);
        let listing = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            listed = self.source.list(&self.config.namespace) => listed.map_err(Error::InitialList)?,
        };
        self.replace(listing);

        let mut needs_relist = false;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            if needs_relist {
                self.record(|stats| stats.connection_status = WatchConnectionStatus::Listing);
                let listed = tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    listed = self.source.list(&self.config.namespace) => listed,
                };
                match listed {
                    Ok(listing) => {
                        self.record(|stats| stats.relists += 1);
                        self.replace(listing);
                        needs_relist = false;
                    }
                    Err(e) => {
                        if !self.back_off(e, cancel).await? {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }

            let opened = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                opened = self.source.watch(&self.config.namespace, &self.resource_version) => opened,
            };
            let stream = match opened {
                Ok(stream) => stream,
                Err(SourceError::Gone(reason)) => {
                    info!("⏳ Watch from rv {} expired ({}), relisting", self.resource_version, reason);
                    needs_relist = true;
                    // a version that expires as soon as it is listed counts as a failed attempt
                    if !self.back_off(SourceError::Gone(reason), cancel).await? {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => {
                    if !self.back_off(e, cancel).await? {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.record(|stats| stats.connection_status = WatchConnectionStatus::Connected);
            // the initial list is fully applied and a watch is established
            self.notifier.mark_synced();
            debug!("📡 Watching pods in {} from rv {}", self.config.namespace, self.resource_version);

            match self.consume(stream, cancel).await {
                StreamEnd::Cancelled => return Ok(()),
                StreamEnd::Closed => {
                    debug!("🔍 Watch stream ended normally, reconnecting from rv {}", self.resource_version);
                    if !pause(self.config.restart_delay, cancel).await {
                        return Ok(());
                    }
                }
                StreamEnd::Expired(reason) => {
                    info!("⏳ Watch from rv {} expired ({}), relisting", self.resource_version, reason);
                    needs_relist = true;
                    if !pause(self.config.restart_delay, cancel).await {
                        return Ok(());
                    }
                }
                StreamEnd::Dropped(e) => {
                    warn!("⚠️  Watch stream dropped: {}, reconnecting from rv {}", e, self.resource_version);
                    if !self.back_off(e, cancel).await? {
                        return Ok(());
                    }
                }
            }
            self.record(|stats| {
                stats.watch_restarts += 1;
                stats.connection_status = WatchConnectionStatus::Reconnecting;
            });
        }
    }

    async fn consume(&mut self, mut stream: WatchStream, cancel: &CancellationToken) -> StreamEnd {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return StreamEnd::Cancelled,
                next = stream.next() => next,
            };
            match next {
                None => return StreamEnd::Closed,
                Some(Ok(event)) => {
                    // the connection is healthy again
                    self.failures = 0;
                    self.apply(event);
                }
                Some(Err(SourceError::Gone(reason))) => return StreamEnd::Expired(reason),
                Some(Err(e)) => return StreamEnd::Dropped(e),
            }
        }
    }

    /// Count a failed attempt and wait before the next one
    ///
    /// Returns `Ok(false)` when cancelled while waiting.
    async fn back_off(&mut self, err: SourceError, cancel: &CancellationToken) -> Result<bool> {
        if matches!(err, SourceError::Auth(_)) {
            return Err(err.into());
        }

        self.failures += 1;
        if self.failures >= self.config.max_consecutive_failures {
            return Err(Error::WatchRetriesExhausted {
                attempts: self.failures,
                last: err,
            });
        }

        let delay = self.config.backoff_for(self.failures);
        warn!(
            "❌ Pod watch failed (attempt {}/{}): {}, retrying in {:?}",
            self.failures, self.config.max_consecutive_failures, err, delay
        );
        self.record(|stats| stats.connection_status = WatchConnectionStatus::Reconnecting);

        Ok(pause(delay, cancel).await)
    }

    /// Apply a full listing as the new truth
    ///
    /// Unknown keys surface as adds, unchanged ones are reconciled, changed
    /// ones become updates and keys missing from the listing are deleted with
    /// their last known state.
    fn replace(&mut self, listing: Listing) {
        let Listing {
            items,
            resource_version,
        } = listing;
        let listed: HashSet<ObjectKey> = items.iter().map(ResourceObject::key).collect();

        let vanished: Vec<ObjectKey> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| !listed.contains(key))
            .collect();
        for key in vanished {
            let last_known = self.store.get(&key);
            self.dispatch(ChangeEvent::Deleted(DeletedPayload::FinalStateUnknown(
                DeletedFinalStateUnknown {
                    key: key.clone(),
                    last_known,
                },
            )));
            self.store.delete(&key);
        }

        let count = items.len();
        for obj in items {
            let change = self.upsert(obj);
            self.dispatch(change);
        }

        info!("📋 Listed {} pods in {} at rv {}", count, self.config.namespace, resource_version);
        self.set_resource_version(resource_version);
        self.record(|stats| stats.lists += 1);
    }

    fn upsert(&self, obj: ResourceObject) -> ChangeEvent {
        match self.store.put(obj.clone()) {
            Some(old) if old.resource_version != obj.resource_version => ChangeEvent::Modified {
                old: Some(old),
                new: obj,
            },
            _ => ChangeEvent::Added(obj),
        }
    }

    fn apply(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Bookmark { resource_version } => {
                debug!("🔖 Bookmark at rv {}", resource_version);
                self.set_resource_version(resource_version);
            }
            WatchEvent::Added(Payload::Object(obj)) => {
                self.set_resource_version(obj.resource_version.clone());
                let change = self.upsert(obj);
                self.dispatch(change);
            }
            WatchEvent::Modified(Payload::Object(new)) => {
                self.set_resource_version(new.resource_version.clone());
                let old = self.store.put(new.clone());
                self.dispatch(ChangeEvent::Modified { old, new });
            }
            WatchEvent::Deleted(Payload::Object(obj)) => {
                self.set_resource_version(obj.resource_version.clone());
                let key = obj.key();
                // dispatch first so the tombstone resolver still sees the entry
                self.dispatch(ChangeEvent::Deleted(DeletedPayload::Object(obj)));
                self.store.delete(&key);
            }
            WatchEvent::Deleted(Payload::Malformed(MalformedPayload {
                key: Some(key),
                reason,
            })) => {
                warn!("⚠️  Unreadable delete payload for {}: {}", key, reason);
                self.record(|stats| stats.malformed_events += 1);
                self.dispatch(ChangeEvent::Deleted(DeletedPayload::Unrecognized {
                    key: key.clone(),
                    reason,
                }));
                self.store.delete(&key);
            }
            WatchEvent::Added(Payload::Malformed(malformed))
            | WatchEvent::Modified(Payload::Malformed(malformed))
            | WatchEvent::Deleted(Payload::Malformed(malformed)) => {
                warn!(
                    "⚠️  Dropping unreadable watch event for {}: {}",
                    malformed
                        .key
                        .as_ref()
                        .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
                    malformed.reason
                );
                self.record(|stats| stats.malformed_events += 1);
            }
        }
    }

    fn dispatch(&mut self, change: ChangeEvent) {
        let outcome = self.dispatcher.dispatch(change, &self.store);
        self.record(|stats| {
            stats.events_applied += 1;
            match outcome {
                Dispatched::Resync => stats.resyncs += 1,
                Dispatched::Reconciled => stats.reconciled += 1,
                _ => {}
            }
        });
    }

    fn set_resource_version(&mut self, resource_version: String) {
        self.record(|stats| stats.resource_version = Some(resource_version.clone()));
        self.resource_version = resource_version;
    }

    fn record(&self, update: impl FnOnce(&mut ReflectorStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

/// Wait out `delay`; `false` when cancelled first
///
/// A zero delay still yields so the task never reconnects in a busy loop.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = sleep(delay) => true,
    }
}
