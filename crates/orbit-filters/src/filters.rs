//! Entity filters: fixed sets of named, optional leaf slots.
//!
//! Slots are visited in declaration order so the same filter always renders
//! the same SQL; the result is an AND, so the order carries no meaning.

use orbit_core::StateType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::columns::{self, deployments, flow_runs, flows, task_runs};
use crate::leaf::{AnyOf, Equals, Exists, Leaf, NullableAnyOf, TagSet, TimeRange};
use crate::predicate::{Column, Predicate};

/// An entity filter: the AND of its present slots.
pub trait Filter {
    fn clauses(&self) -> Vec<Predicate>;

    fn predicate(&self) -> Predicate {
        Predicate::and(self.clauses())
    }
}

fn slot<L: Leaf>(out: &mut Vec<Predicate>, leaf: &Option<L>, field: &L::Field) {
    if let Some(leaf) = leaf {
        out.push(leaf.compile(field));
    }
}

/// State columns of a run table.
#[derive(Debug, Clone, Copy)]
pub struct StateColumns {
    pub state_type: Column,
    pub name: Column,
}

/// A run's state, one level deep: `type` and `name`, combined by AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateFilter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub state_type: Option<AnyOf<StateType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AnyOf<String>>,
}

impl Leaf for StateFilter {
    type Field = StateColumns;

    fn clauses(&self, columns: &StateColumns) -> Vec<Predicate> {
        let mut out = Vec::new();
        slot(&mut out, &self.state_type, &columns.state_type);
        slot(&mut out, &self.name, &columns.name);
        out
    }
}

/// Only flows matching all criteria are selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AnyOf<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AnyOf<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

impl Filter for FlowFilter {
    fn clauses(&self) -> Vec<Predicate> {
        let mut out = Vec::new();
        slot(&mut out, &self.id, &flows::ID);
        slot(&mut out, &self.name, &flows::NAME);
        slot(&mut out, &self.tags, &flows::TAGS);
        out
    }
}

/// Only flow runs matching all criteria are selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowRunFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AnyOf<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AnyOf<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<NullableAnyOf<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_version: Option<AnyOf<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_start_time: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_start_time: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_run_id: Option<NullableAnyOf<Uuid>>,
}

impl Filter for FlowRunFilter {
    fn clauses(&self) -> Vec<Predicate> {
        let state = StateColumns {
            state_type: flow_runs::STATE_TYPE,
            name: flow_runs::STATE_NAME,
        };
        let mut out = Vec::new();
        slot(&mut out, &self.id, &flow_runs::ID);
        slot(&mut out, &self.name, &flow_runs::NAME);
        slot(&mut out, &self.tags, &flow_runs::TAGS);
        slot(&mut out, &self.deployment_id, &flow_runs::DEPLOYMENT_ID);
        slot(&mut out, &self.state, &state);
        slot(&mut out, &self.flow_version, &flow_runs::FLOW_VERSION);
        slot(&mut out, &self.start_time, &flow_runs::START_TIME);
        slot(&mut out, &self.expected_start_time, &flow_runs::EXPECTED_START_TIME);
        slot(
            &mut out,
            &self.next_scheduled_start_time,
            &flow_runs::NEXT_SCHEDULED_START_TIME,
        );
        slot(&mut out, &self.parent_task_run_id, &flow_runs::PARENT_TASK_RUN_ID);
        out
    }
}

/// Only task runs matching all criteria are selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRunFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AnyOf<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AnyOf<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeRange>,
    /// Whether the task run is the parent of a subflow run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subflow_runs: Option<Exists>,
}

impl Filter for TaskRunFilter {
    fn clauses(&self) -> Vec<Predicate> {
        let state = StateColumns {
            state_type: task_runs::STATE_TYPE,
            name: task_runs::STATE_NAME,
        };
        let mut out = Vec::new();
        slot(&mut out, &self.id, &task_runs::ID);
        slot(&mut out, &self.name, &task_runs::NAME);
        slot(&mut out, &self.tags, &task_runs::TAGS);
        slot(&mut out, &self.state, &state);
        slot(&mut out, &self.start_time, &task_runs::START_TIME);
        slot(&mut out, &self.subflow_runs, &columns::SUBFLOW_RUNS);
        out
    }
}

/// Only deployments matching all criteria are selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AnyOf<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<AnyOf<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_schedule_active: Option<Equals<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
}

impl Filter for DeploymentFilter {
    fn clauses(&self) -> Vec<Predicate> {
        let mut out = Vec::new();
        slot(&mut out, &self.id, &deployments::ID);
        slot(&mut out, &self.name, &deployments::NAME);
        slot(&mut out, &self.is_schedule_active, &deployments::IS_SCHEDULE_ACTIVE);
        slot(&mut out, &self.tags, &deployments::TAGS);
        out
    }
}
