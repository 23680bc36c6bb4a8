/**
 * Event dispatch
 *
 * Turns store mutations into add/update/delete notifications. Runs inline
 * on the reflector task, so notifications for a key keep the order in
 * which the store applied them.
 */
use super::classifier::{ChangeRecord, classify};
use super::object::{ChangeEvent, DeletedObject, DeletedPayload, ObjectKey, ResourceObject};
use super::store::Store;
use super::tombstone;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Consumer callbacks
///
/// Called synchronously on the reflector task. Keep them fast and
/// non-blocking; queue heavy work elsewhere.
pub trait EventHandler: Send {
    fn on_add(&self, _obj: &ResourceObject) {}

    fn on_update(&self, _old: &ResourceObject, _new: &ResourceObject, _changes: &[ChangeRecord]) {}

    fn on_delete(&self, _deleted: &DeletedObject) {}

    /// A redelivery with an unchanged resourceVersion; not an update
    fn on_resync(&self, _obj: &ResourceObject) {}
}

type AddFn = Box<dyn Fn(&ResourceObject) + Send>;
type UpdateFn = Box<dyn Fn(&ResourceObject, &ResourceObject, &[ChangeRecord]) + Send>;
type DeleteFn = Box<dyn Fn(&DeletedObject) + Send>;
type ResyncFn = Box<dyn Fn(&ResourceObject) + Send>;

/// [`EventHandler`] assembled from closures
#[derive(Default)]
pub struct HandlerFuncs {
    add: Option<AddFn>,
    update: Option<UpdateFn>,
    delete: Option<DeleteFn>,
    resync: Option<ResyncFn>,
}

impl HandlerFuncs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_add(mut self, f: impl Fn(&ResourceObject) + Send + 'static) -> Self {
        self.add = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_update(
        mut self,
        f: impl Fn(&ResourceObject, &ResourceObject, &[ChangeRecord]) + Send + 'static,
    ) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_delete(mut self, f: impl Fn(&DeletedObject) + Send + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_resync(mut self, f: impl Fn(&ResourceObject) + Send + 'static) -> Self {
        self.resync = Some(Box::new(f));
        self
    }
}

impl EventHandler for HandlerFuncs {
    fn on_add(&self, obj: &ResourceObject) {
        if let Some(f) = &self.add {
            f(obj);
        }
    }

    fn on_update(&self, old: &ResourceObject, new: &ResourceObject, changes: &[ChangeRecord]) {
        if let Some(f) = &self.update {
            f(old, new, changes);
        }
    }

    fn on_delete(&self, deleted: &DeletedObject) {
        if let Some(f) = &self.delete {
            f(deleted);
        }
    }

    fn on_resync(&self, obj: &ResourceObject) {
        if let Some(f) = &self.resync {
            f(obj);
        }
    }
}

/// What a single dispatch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Added,
    /// Add for a key already dispatched, e.g. replayed after a reconnect
    Reconciled,
    Updated(Vec<ChangeRecord>),
    Resync,
    Deleted,
    /// Delete reported without attributes, nothing was known about the object
    DeletedKeyOnly,
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn EventHandler>>,
    known: HashSet<ObjectKey>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(handlers: Vec<Box<dyn EventHandler>>) -> Self {
        Self {
            handlers,
            known: HashSet::new(),
        }
    }

    /// Dispatch one applied change
    ///
    /// For deletes `store` must still hold the removed entry so the
    /// tombstone can be recovered from it.
    pub fn dispatch(&mut self, event: ChangeEvent, store: &Store) -> Dispatched {
        match event {
            ChangeEvent::Added(obj) | ChangeEvent::Modified { old: None, new: obj } => {
                self.added(&obj)
            }
            ChangeEvent::Modified {
                old: Some(old),
                new,
            } => self.modified(&old, &new),
            ChangeEvent::Deleted(payload) => self.deleted(payload, store),
        }
    }

    fn added(&mut self, obj: &ResourceObject) -> Dispatched {
        if !self.known.insert(obj.key()) {
            debug!("🔄 Pod [{}] reconciled (rv {})", obj.key(), obj.resource_version);
            return Dispatched::Reconciled;
        }

        debug!("➕ Pod [{}] added", obj.key());
        for handler in &self.handlers {
            handler.on_add(obj);
        }
        Dispatched::Added
    }

    fn modified(&mut self, old: &ResourceObject, new: &ResourceObject) -> Dispatched {
        self.known.insert(new.key());

        if old.resource_version == new.resource_version {
            debug!("🔁 Pod [{}] resync (rv {})", new.key(), new.resource_version);
            for handler in &self.handlers {
                handler.on_resync(new);
            }
            return Dispatched::Resync;
        }

        let changes = classify(old, new);
        debug!(
            "📝 Pod [{}] updated (rv {} -> {}, {} field changes)",
            new.key(),
            old.resource_version,
            new.resource_version,
            changes.len()
        );
        for handler in &self.handlers {
            handler.on_update(old, new, &changes);
        }
        Dispatched::Updated(changes)
    }

    fn deleted(&mut self, payload: DeletedPayload, store: &Store) -> Dispatched {
        self.known.remove(&payload.key());

        let deleted = match payload {
            DeletedPayload::Object(obj) => DeletedObject::Known(obj),
            other => match tombstone::resolve(&other, store) {
                Ok(tombstone) => DeletedObject::Known(tombstone.last_known),
                Err(e) => {
                    warn!("delete dispatch error: {e}, reporting key only");
                    DeletedObject::KeyOnly(e.key)
                }
            },
        };

        debug!("🗑️  Pod [{}] deleted", deleted.key());
        for handler in &self.handlers {
            handler.on_delete(&deleted);
        }

        match deleted {
            DeletedObject::Known(_) => Dispatched::Deleted,
            DeletedObject::KeyOnly(_) => Dispatched::DeletedKeyOnly,
        }
    }
}
