/**
 * Mirrored resource model
 *
 * The slice of a Pod the cache keeps: identity, resourceVersion and the
 * status attributes change classification looks at.
 */
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use std::fmt;

/// Identity of a mirrored object, unique per collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<&str> for Phase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<&str> for ConditionStatus {
    fn from(value: &str) -> Self {
        match value {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub condition_type: String,
    pub status: ConditionStatus,
}

impl Condition {
    #[must_use]
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
        }
    }
}

/// Latest known state of one mirrored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceObject {
    pub namespace: String,
    pub name: String,
    /// Opaque token, only ever compared for equality
    pub resource_version: String,
    pub phase: Phase,
    pub pod_ip: String,
    pub conditions: Vec<Condition>,
}

impl ResourceObject {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        resource_version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            resource_version: resource_version.into(),
            phase: Phase::default(),
            pod_ip: String::new(),
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    #[must_use]
    pub fn with_pod_ip(mut self, pod_ip: impl Into<String>) -> Self {
        self.pod_ip = pod_ip.into();
        self
    }

    /// Set a condition, replacing any existing one of the same type
    #[must_use]
    pub fn with_condition(mut self, condition_type: &str, status: ConditionStatus) -> Self {
        self.conditions.retain(|c| c.condition_type != condition_type);
        self.conditions.push(Condition::new(condition_type, status));
        self
    }

    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Status of the condition with the given type, `None` when absent
    #[must_use]
    pub fn condition_status(&self, condition_type: &str) -> Option<ConditionStatus> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
            .map(|c| c.status)
    }
}

/// Why a remote payload could not be read as a [`ResourceObject`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("object has no metadata.name")]
    MissingName,
    #[error("object {0} has no metadata.namespace")]
    MissingNamespace(String),
    #[error("object {0} has no metadata.resourceVersion")]
    MissingResourceVersion(ObjectKey),
}

impl TryFrom<&Pod> for ResourceObject {
    type Error = ConvertError;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let name = pod.metadata.name.clone().ok_or(ConvertError::MissingName)?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| ConvertError::MissingNamespace(name.clone()))?;
        let resource_version = pod.metadata.resource_version.clone().ok_or_else(|| {
            ConvertError::MissingResourceVersion(ObjectKey::new(namespace.clone(), name.clone()))
        })?;

        let status = pod.status.as_ref();
        let phase = status
            .and_then(|s| s.phase.as_deref())
            .map_or(Phase::Unknown, Phase::from);
        let pod_ip = status.and_then(|s| s.pod_ip.clone()).unwrap_or_default();

        let mut conditions: Vec<Condition> = Vec::new();
        for c in status.and_then(|s| s.conditions.as_ref()).into_iter().flatten() {
            // condition types are unique; keep the first occurrence
            if conditions.iter().any(|seen| seen.condition_type == c.type_) {
                continue;
            }
            conditions.push(Condition::new(c.type_.clone(), ConditionStatus::from(c.status.as_str())));
        }

        Ok(Self {
            namespace,
            name,
            resource_version,
            phase,
            pod_ip,
            conditions,
        })
    }
}

/// Payload of a `Deleted` change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedPayload {
    /// A full object
    Object(ResourceObject),
    /// The deletion was inferred (e.g. missing from a relist); may carry the last state seen
    FinalStateUnknown(DeletedFinalStateUnknown),
    /// The payload could not be read; only the key survived
    Unrecognized { key: ObjectKey, reason: String },
}

impl DeletedPayload {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::Object(obj) => obj.key(),
            Self::FinalStateUnknown(wrapper) => wrapper.key.clone(),
            Self::Unrecognized { key, .. } => key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedFinalStateUnknown {
    pub key: ObjectKey,
    pub last_known: Option<ResourceObject>,
}

/// A change applied to the local store, in application order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(ResourceObject),
    Modified {
        old: Option<ResourceObject>,
        new: ResourceObject,
    },
    Deleted(DeletedPayload),
}

/// What a delete notification carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedObject {
    Known(ResourceObject),
    /// Nothing but the key is known about the deleted object
    KeyOnly(ObjectKey),
}

impl DeletedObject {
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        match self {
            Self::Known(obj) => obj.key(),
            Self::KeyOnly(key) => key.clone(),
        }
    }

    #[must_use]
    pub const fn object(&self) -> Option<&ResourceObject> {
        match self {
            Self::Known(obj) => Some(obj),
            Self::KeyOnly(_) => None,
        }
    }
}
