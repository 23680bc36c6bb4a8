#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use podmirror::k8s::cache::{
    ChangeRecord, DeletedObject, EventHandler, ObjectKey, Phase, ResourceObject,
};
use podmirror::k8s::source::{
    Listing, MalformedPayload, Payload, RemoteSource, SourceError, WatchEvent, WatchStream,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type WatchSender = mpsc::UnboundedSender<Result<WatchEvent, SourceError>>;

enum WatchScript {
    Open(UnboundedReceiverStream<Result<WatchEvent, SourceError>>),
    Fail(SourceError),
}

#[derive(Default)]
struct Script {
    lists: VecDeque<Result<Listing, SourceError>>,
    watches: VecDeque<WatchScript>,
    list_calls: usize,
    watch_versions: Vec<String>,
}

/// In-memory remote source replaying scripted lists and watch streams
///
/// Unscripted lists never complete; unscripted watches open a stream that
/// never yields.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list(&self, items: Vec<ResourceObject>, resource_version: &str) {
        self.script.lock().unwrap().lists.push_back(Ok(Listing {
            items,
            resource_version: resource_version.to_string(),
        }));
    }

    pub fn push_list_error(&self, err: SourceError) {
        self.script.lock().unwrap().lists.push_back(Err(err));
    }

    /// Script the next watch to open; events are fed through the returned sender
    pub fn push_watch(&self) -> WatchSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script
            .lock()
            .unwrap()
            .watches
            .push_back(WatchScript::Open(UnboundedReceiverStream::new(rx)));
        tx
    }

    pub fn push_watch_error(&self, err: SourceError) {
        self.script
            .lock()
            .unwrap()
            .watches
            .push_back(WatchScript::Fail(err));
    }

    pub fn list_calls(&self) -> usize {
        self.script.lock().unwrap().list_calls
    }

    /// resourceVersions each watch was opened from, in order
    pub fn watch_versions(&self) -> Vec<String> {
        self.script.lock().unwrap().watch_versions.clone()
    }
}

#[async_trait]
impl RemoteSource for ScriptedSource {
    async fn list(&self, _namespace: &str) -> Result<Listing, SourceError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            script.list_calls += 1;
            script.lists.pop_front()
        };
        match next {
            Some(listed) => listed,
            None => futures::future::pending().await,
        }
    }

    async fn watch(
        &self,
        _namespace: &str,
        resource_version: &str,
    ) -> Result<WatchStream, SourceError> {
        let next = {
            let mut script = self.script.lock().unwrap();
            script.watch_versions.push(resource_version.to_string());
            script.watches.pop_front()
        };
        match next {
            Some(WatchScript::Open(stream)) => Ok(stream.boxed()),
            Some(WatchScript::Fail(err)) => Err(err),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Restless {
    EndsAtOnce,
    Expires,
}

/// Source whose lists are always empty and whose watches never deliver an event
///
/// Either every watch stream ends as soon as it opens, or every open fails
/// with an expired resourceVersion.
#[derive(Clone)]
pub struct RestlessSource {
    behaviour: Restless,
    list_calls: Arc<AtomicUsize>,
    watch_opens: Arc<AtomicUsize>,
}

impl RestlessSource {
    fn with(behaviour: Restless) -> Self {
        Self {
            behaviour,
            list_calls: Arc::default(),
            watch_opens: Arc::default(),
        }
    }

    pub fn ends_at_once() -> Self {
        Self::with(Restless::EndsAtOnce)
    }

    pub fn expires() -> Self {
        Self::with(Restless::Expires)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_opens(&self) -> usize {
        self.watch_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for RestlessSource {
    async fn list(&self, _namespace: &str) -> Result<Listing, SourceError> {
        let n = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Listing {
            items: Vec::new(),
            resource_version: n.to_string(),
        })
    }

    async fn watch(
        &self,
        _namespace: &str,
        _resource_version: &str,
    ) -> Result<WatchStream, SourceError> {
        self.watch_opens.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Restless::EndsAtOnce => Ok(futures::stream::empty().boxed()),
            Restless::Expires => Err(SourceError::Gone("too old resource version".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Add(ResourceObject),
    Update {
        old: ResourceObject,
        new: ResourceObject,
        changes: Vec<ChangeRecord>,
    },
    Delete(DeletedObject),
    Resync(ResourceObject),
}

/// Handler that records every notification
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn added_names(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Add(obj) => Some(obj.name),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(ResourceObject, ResourceObject, Vec<ChangeRecord>)> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Update { old, new, changes } => Some((old, new, changes)),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<DeletedObject> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Delete(deleted) => Some(deleted),
                _ => None,
            })
            .collect()
    }

    pub fn resyncs(&self) -> Vec<ResourceObject> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Resync(obj) => Some(obj),
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

impl EventHandler for Recorder {
    fn on_add(&self, obj: &ResourceObject) {
        self.push(Notification::Add(obj.clone()));
    }

    fn on_update(&self, old: &ResourceObject, new: &ResourceObject, changes: &[ChangeRecord]) {
        self.push(Notification::Update {
            old: old.clone(),
            new: new.clone(),
            changes: changes.to_vec(),
        });
    }

    fn on_delete(&self, deleted: &DeletedObject) {
        self.push(Notification::Delete(deleted.clone()));
    }

    fn on_resync(&self, obj: &ResourceObject) {
        self.push(Notification::Resync(obj.clone()));
    }
}

pub fn pod(name: &str, rv: &str, phase: Phase) -> ResourceObject {
    ResourceObject::new("default", name, rv).with_phase(phase)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

pub fn added(obj: ResourceObject) -> Result<WatchEvent, SourceError> {
    Ok(WatchEvent::Added(Payload::Object(obj)))
}

pub fn modified(obj: ResourceObject) -> Result<WatchEvent, SourceError> {
    Ok(WatchEvent::Modified(Payload::Object(obj)))
}

pub fn deleted(obj: ResourceObject) -> Result<WatchEvent, SourceError> {
    Ok(WatchEvent::Deleted(Payload::Object(obj)))
}

pub fn malformed_delete(name: Option<&str>) -> Result<WatchEvent, SourceError> {
    Ok(WatchEvent::Deleted(Payload::Malformed(MalformedPayload {
        key: name.map(key),
        reason: "payload is not a pod".to_string(),
    })))
}

/// Poll `condition` until it holds or a few seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
