use crate::k8s::cache::config::WATCH_TIMEOUT_SECONDS;
use crate::k8s::cache::object::{ObjectKey, ResourceObject};
use crate::k8s::source::{
    Listing, MalformedPayload, Payload, RemoteSource, SourceError, WatchEvent, WatchStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, ObjectList, WatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, warn};

/// [`RemoteSource`] over the pods of a namespace in a live cluster
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
    watch_timeout_secs: u32,
}

impl KubePodSource {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self {
            client,
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
        }
    }

    /// Server-side timeout for each watch request
    #[must_use]
    pub const fn with_watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = secs;
        self
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl RemoteSource for KubePodSource {
    async fn list(&self, namespace: &str) -> Result<Listing, SourceError> {
        let pod_list: ObjectList<Pod> = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(classify_kube_error)?;

        let resource_version = pod_list.metadata.resource_version.clone().ok_or_else(|| {
            SourceError::Transport("pod list carried no resourceVersion".to_string())
        })?;

        let mut items = Vec::with_capacity(pod_list.items.len());
        for pod in &pod_list.items {
            match ResourceObject::try_from(pod) {
                Ok(obj) => items.push(obj),
                Err(e) => warn!("skipping unreadable pod in list of {namespace}: {e}"),
            }
        }
        debug!(namespace, count = items.len(), rv = %resource_version, "listed pods");

        Ok(Listing {
            items,
            resource_version,
        })
    }

    async fn watch(
        &self,
        namespace: &str,
        resource_version: &str,
    ) -> Result<WatchStream, SourceError> {
        let wp = watch_params(self.watch_timeout_secs);

        let stream = self
            .api(namespace)
            .watch(&wp, resource_version)
            .await
            .map_err(classify_kube_error)?;

        let namespace = namespace.to_string();
        Ok(stream
            .map(move |item| match item {
                Ok(event) => convert_event(event, &namespace),
                Err(e) => Err(classify_kube_error(e)),
            })
            .boxed())
    }
}

/// Map a kube client error onto the source error taxonomy
#[must_use]
pub fn classify_kube_error(err: kube::Error) -> SourceError {
    match err {
        kube::Error::Api(resp) => classify_status(resp.code, resp.message),
        other => SourceError::Transport(other.to_string()),
    }
}

fn classify_status(code: u16, message: String) -> SourceError {
    match code {
        410 => SourceError::Gone(message),
        401 | 403 => SourceError::Auth(message),
        _ => SourceError::Transport(format!("{code}: {message}")),
    }
}

fn convert_event(
    event: kube::api::WatchEvent<Pod>,
    namespace: &str,
) -> Result<WatchEvent, SourceError> {
    match event {
        kube::api::WatchEvent::Added(pod) => Ok(WatchEvent::Added(payload(&pod, namespace))),
        kube::api::WatchEvent::Modified(pod) => Ok(WatchEvent::Modified(payload(&pod, namespace))),
        kube::api::WatchEvent::Deleted(pod) => Ok(WatchEvent::Deleted(payload(&pod, namespace))),
        kube::api::WatchEvent::Bookmark(bookmark) => Ok(WatchEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        }),
        kube::api::WatchEvent::Error(resp) => Err(classify_status(resp.code, resp.message)),
    }
}

fn payload(pod: &Pod, namespace: &str) -> Payload {
    match ResourceObject::try_from(pod) {
        Ok(obj) => Payload::Object(obj),
        Err(e) => {
            // the Api is namespaced, so a missing namespace still identifies the object
            let key = pod.metadata.name.as_ref().map(|name| {
                ObjectKey::new(pod.namespace().unwrap_or_else(|| namespace.to_string()), name)
            });
            Payload::Malformed(MalformedPayload {
                key,
                reason: e.to_string(),
            })
        }
    }
}

/// Watch parameters; bookmarks are on by default
fn watch_params(timeout_secs: u32) -> WatchParams {
    WatchParams::default().timeout(timeout_secs)
}
