use chrono::{DateTime, Utc};
use orbit_core::{Schedule, StateType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag added to every run created by the schedule materializer.
pub const AUTO_SCHEDULED_TAG: &str = "auto-scheduled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowCreate {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A named, schedulable configuration of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub name: String,
    pub schedule: Option<Schedule>,
    pub is_schedule_active: bool,
    pub tags: Vec<String>,
    pub parameters: serde_json::Value,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentCreate {
    pub flow_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default = "default_true")]
    pub is_schedule_active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

impl DeploymentCreate {
    pub fn new(flow_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            flow_id,
            name: name.into(),
            schedule: None,
            is_schedule_active: true,
            tags: Vec::new(),
            parameters: empty_object(),
        }
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_schedule_active = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRun {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub deployment_id: Option<Uuid>,
    pub name: String,
    pub tags: Vec<String>,
    pub flow_version: Option<String>,
    pub parameters: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub auto_scheduled: bool,
    pub parent_task_run_id: Option<Uuid>,
    pub state_type: Option<StateType>,
    pub state_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub expected_start_time: Option<DateTime<Utc>>,
    pub next_scheduled_start_time: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRunCreate {
    pub flow_id: Uuid,
    #[serde(default)]
    pub deployment_id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub flow_version: Option<String>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    /// A second create with the same key for the same flow returns the
    /// existing run instead of inserting.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub parent_task_run_id: Option<Uuid>,
    #[serde(default)]
    pub state_type: Option<StateType>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_start_time: Option<DateTime<Utc>>,
}

impl FlowRunCreate {
    pub fn new(flow_id: Uuid) -> Self {
        Self {
            flow_id,
            deployment_id: None,
            name: None,
            tags: Vec::new(),
            flow_version: None,
            parameters: empty_object(),
            idempotency_key: None,
            parent_task_run_id: None,
            state_type: None,
            state_name: None,
            start_time: None,
            expected_start_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub flow_run_id: Uuid,
    pub task_key: String,
    pub name: String,
    pub tags: Vec<String>,
    pub state_type: Option<StateType>,
    pub state_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunCreate {
    pub flow_run_id: Uuid,
    pub task_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub state_type: Option<StateType>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

impl TaskRunCreate {
    pub fn new(flow_run_id: Uuid, task_key: impl Into<String>) -> Self {
        Self {
            flow_run_id,
            task_key: task_key.into(),
            name: None,
            tags: Vec::new(),
            state_type: None,
            state_name: None,
            start_time: None,
        }
    }
}

/// A flow run produced by schedule generation, not yet persisted.
///
/// The id is assigned up front so the bulk insert can report exactly which
/// candidates made it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub deployment_id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub parameters: serde_json::Value,
    pub idempotency_key: String,
    pub state_type: StateType,
    pub state_name: String,
    pub expected_start_time: DateTime<Utc>,
    pub next_scheduled_start_time: DateTime<Utc>,
    pub auto_scheduled: bool,
}

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
