use crate::kind::ResourceRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Pending,
    Creating,
    Ready,
    Failed,
    Destroying,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Creating,
    Ready,
    Failed,
    Destroying,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Delete,
    Rollback,
}

/// Per-resource persisted state, keyed implicitly by its embedded
/// `reference` inside `EnvironmentRecord::resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub reference: ResourceRef,
    pub provider: Option<String>,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Non-nil (though possibly empty) once status is `ready`; cleared once
    /// `destroyed`.
    #[serde(default)]
    pub result: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn pending(reference: ResourceRef, now: DateTime<Utc>) -> Self {
        ResourceState {
            reference,
            provider: None,
            status: ResourceStatus::Pending,
            last_error: None,
            result: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_ready(&mut self, provider: String, result: serde_json::Map<String, serde_json::Value>, now: DateTime<Utc>) {
        self.provider = Some(provider);
        self.status = ResourceStatus::Ready;
        self.last_error = None;
        self.result = result;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, message: String, now: DateTime<Utc>) {
        self.status = ResourceStatus::Failed;
        self.last_error = Some(message);
        self.updated_at = now;
    }

    pub fn mark_destroyed(&mut self, now: DateTime<Utc>) {
        self.status = ResourceStatus::Destroyed;
        self.result.clear();
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub resource: ResourceRef,
    pub operation: Operation,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One phase of the execution plan: an unordered set of resource
/// references with no mutual dependency.
pub type Phase = Vec<ResourceRef>;

/// A totally ordered sequence of phases, as produced by the Scheduler and
/// persisted verbatim so Delete can reconstruct and reverse it after a
/// restart.
pub type ExecutionPlan = Vec<Phase>;

/// The unit of persistence: one per test identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub id: String,
    pub stage: String,
    pub status: EnvironmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The full original spec map, retained so Delete/Rollback can run
    /// after a process restart without the caller re-supplying it.
    pub spec: serde_json::Value,
    pub resources: Vec<ResourceState>,
    pub execution_plan: ExecutionPlan,
    pub errors: Vec<ErrorRecord>,
    pub artifact_dir: String,
}

impl EnvironmentRecord {
    pub fn new(id: String, stage: String, spec: serde_json::Value, artifact_dir: String, now: DateTime<Utc>) -> Self {
        EnvironmentRecord {
            id,
            stage,
            status: EnvironmentStatus::Pending,
            created_at: now,
            updated_at: now,
            spec,
            resources: Vec::new(),
            execution_plan: Vec::new(),
            errors: Vec::new(),
            artifact_dir,
        }
    }

    pub fn resource_mut(&mut self, reference: &ResourceRef) -> Option<&mut ResourceState> {
        self.resources.iter_mut().find(|r| &r.reference == reference)
    }

    pub fn resource(&self, reference: &ResourceRef) -> Option<&ResourceState> {
        self.resources.iter().find(|r| &r.reference == reference)
    }

    pub fn upsert_pending(&mut self, reference: ResourceRef, now: DateTime<Utc>) -> &mut ResourceState {
        if self.resource(&reference).is_none() {
            self.resources.push(ResourceState::pending(reference.clone(), now));
        }
        self.resource_mut(&reference).expect("just inserted")
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;

    #[test]
    fn round_trip_preserves_equality() {
        let now = Utc::now();
        let mut record = EnvironmentRecord::new(
            "test-1".into(),
            "create".into(),
            serde_json::json!({}),
            "/tmp/test-1".into(),
            now,
        );
        record.upsert_pending(ResourceRef::new(ResourceKind::Key, "k1"), now);
        let json = serde_json::to_string(&record).unwrap();
        let back: EnvironmentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.resources.len(), 1);
        assert_eq!(back.resources[0].reference.name, "k1");
    }

    #[test]
    fn ready_state_has_nonempty_marker_and_destroyed_clears_it() {
        let now = Utc::now();
        let mut state = ResourceState::pending(ResourceRef::new(ResourceKind::Vm, "v1"), now);
        let mut result = serde_json::Map::new();
        result.insert("ip".into(), serde_json::json!("10.0.0.2"));
        state.mark_ready("local".into(), result, now);
        assert_eq!(state.status, ResourceStatus::Ready);
        assert!(!state.result.is_empty());
        state.mark_destroyed(now);
        assert_eq!(state.status, ResourceStatus::Destroyed);
        assert!(state.result.is_empty());
    }
}
