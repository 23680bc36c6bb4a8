pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod informer;
pub mod object;
pub mod reflector;
pub mod store;
pub mod sync;
pub mod tombstone;

pub use classifier::{ChangeField, ChangeRecord, classify};
pub use config::ReflectorConfig;
pub use dispatcher::{Dispatched, EventDispatcher, EventHandler, HandlerFuncs};
pub use informer::{PodInformer, ReflectorHandle};
pub use object::{
    ChangeEvent, Condition, ConditionStatus, DeletedFinalStateUnknown, DeletedObject,
    DeletedPayload, ObjectKey, Phase, ResourceObject,
};
pub use reflector::{Reflector, ReflectorStats, WatchConnectionStatus};
pub use store::Store;
pub use sync::{SyncBarrier, SyncNotifier};
pub use tombstone::{ResolveError, Tombstone};
