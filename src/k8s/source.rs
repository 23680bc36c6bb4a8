/**
 * Remote source seam
 *
 * The reflector consumes a one-shot list plus an incremental watch stream
 * through this trait, which keeps it independent of the wire client.
 */
use crate::k8s::cache::object::{ObjectKey, ResourceObject};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Failures reported by a [`RemoteSource`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection dropped or request failed in transit
    #[error("transport error: {0}")]
    Transport(String),
    /// Credentials were rejected
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The requested resourceVersion is too old to resume from
    #[error("resource version expired: {0}")]
    Gone(String),
}

impl SourceError {
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        matches!(self, Self::Gone(_))
    }
}

/// A payload the source could not turn into a [`ResourceObject`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPayload {
    /// Present when enough metadata survived to identify the object
    pub key: Option<ObjectKey>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Object(ResourceObject),
    Malformed(MalformedPayload),
}

/// One element of a watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Payload),
    Modified(Payload),
    Deleted(Payload),
    /// Progress marker, advances the resourceVersion only
    Bookmark { resource_version: String },
}

/// Result of a full list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub items: Vec<ResourceObject>,
    /// Collection-level version to start the watch from
    pub resource_version: String,
}

pub type WatchStream = BoxStream<'static, Result<WatchEvent, SourceError>>;

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List every object in `namespace`
    async fn list(&self, namespace: &str) -> Result<Listing, SourceError>;

    /// Open a change stream starting after `resource_version`
    async fn watch(&self, namespace: &str, resource_version: &str)
    -> Result<WatchStream, SourceError>;
}
