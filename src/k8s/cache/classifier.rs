use super::config::READY_CONDITION;
use super::object::{ConditionStatus, ResourceObject};
use std::fmt;

/// Status attributes compared on update, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeField {
    Phase,
    PodIp,
    Ready,
}

impl fmt::Display for ChangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Phase => "phase",
            Self::PodIp => "podIP",
            Self::Ready => "ready",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub field: ChangeField,
    pub old_value: String,
    pub new_value: String,
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.old_value, self.new_value)
    }
}

const ABSENT: &str = "<absent>";

fn ready_value(status: Option<ConditionStatus>) -> String {
    status.map_or_else(|| ABSENT.to_string(), |s| s.as_str().to_string())
}

/// Field-level diff of the tracked status attributes
///
/// Emits at most one record per field, phase first, then address, then
/// readiness. A missing Ready condition is its own value.
#[must_use]
pub fn classify(old: &ResourceObject, new: &ResourceObject) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    if old.phase != new.phase {
        changes.push(ChangeRecord {
            field: ChangeField::Phase,
            old_value: old.phase.to_string(),
            new_value: new.phase.to_string(),
        });
    }

    if old.pod_ip != new.pod_ip {
        changes.push(ChangeRecord {
            field: ChangeField::PodIp,
            old_value: old.pod_ip.clone(),
            new_value: new.pod_ip.clone(),
        });
    }

    let old_ready = old.condition_status(READY_CONDITION);
    let new_ready = new.condition_status(READY_CONDITION);
    if old_ready != new_ready {
        changes.push(ChangeRecord {
            field: ChangeField::Ready,
            old_value: ready_value(old_ready),
            new_value: ready_value(new_ready),
        });
    }

    changes
}
