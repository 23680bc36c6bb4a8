use super::object::{DeletedPayload, ObjectKey, ResourceObject};
use super::store::Store;

/// Last known state of an object whose delete event lacked a full payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub key: ObjectKey,
    pub last_known: ResourceObject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no last known state for deleted object {key}")]
pub struct ResolveError {
    pub key: ObjectKey,
}

/// Recover a usable object for a delete notification
///
/// An embedded last-known object wins; otherwise the store's retained copy
/// is used. The store must still hold the entry, so resolve before removal.
///
/// # Errors
///
/// Returns `ResolveError` carrying only the key when neither the payload nor
/// the store knows the object.
pub fn resolve(payload: &DeletedPayload, store: &Store) -> Result<Tombstone, ResolveError> {
    let key = payload.key();
    let embedded = match payload {
        DeletedPayload::Object(obj) => Some(obj.clone()),
        DeletedPayload::FinalStateUnknown(wrapper) => wrapper.last_known.clone(),
        DeletedPayload::Unrecognized { .. } => None,
    };

    embedded
        .or_else(|| store.get(&key))
        .map(|last_known| Tombstone {
            key: key.clone(),
            last_known,
        })
        .ok_or(ResolveError { key })
}
