//! Field accessors for the entity tables the predicates run against.

use crate::predicate::{Column, Relation};

pub mod flows {
    use super::Column;

    pub const TABLE: &str = "flows";
    pub const ID: Column = Column::new(TABLE, "id");
    pub const NAME: Column = Column::new(TABLE, "name");
    pub const TAGS: Column = Column::new(TABLE, "tags");
}

pub mod deployments {
    use super::Column;

    pub const TABLE: &str = "deployments";
    pub const ID: Column = Column::new(TABLE, "id");
    pub const FLOW_ID: Column = Column::new(TABLE, "flow_id");
    pub const NAME: Column = Column::new(TABLE, "name");
    pub const TAGS: Column = Column::new(TABLE, "tags");
    pub const SCHEDULE: Column = Column::new(TABLE, "schedule");
    pub const IS_SCHEDULE_ACTIVE: Column = Column::new(TABLE, "is_schedule_active");
}

pub mod flow_runs {
    use super::Column;

    pub const TABLE: &str = "flow_runs";
    pub const ID: Column = Column::new(TABLE, "id");
    pub const FLOW_ID: Column = Column::new(TABLE, "flow_id");
    pub const DEPLOYMENT_ID: Column = Column::new(TABLE, "deployment_id");
    pub const NAME: Column = Column::new(TABLE, "name");
    pub const TAGS: Column = Column::new(TABLE, "tags");
    pub const STATE_TYPE: Column = Column::new(TABLE, "state_type");
    pub const STATE_NAME: Column = Column::new(TABLE, "state_name");
    pub const FLOW_VERSION: Column = Column::new(TABLE, "flow_version");
    pub const START_TIME: Column = Column::new(TABLE, "start_time");
    pub const EXPECTED_START_TIME: Column = Column::new(TABLE, "expected_start_time");
    pub const NEXT_SCHEDULED_START_TIME: Column =
        Column::new(TABLE, "next_scheduled_start_time");
    pub const PARENT_TASK_RUN_ID: Column = Column::new(TABLE, "parent_task_run_id");
}

pub mod task_runs {
    use super::Column;

    pub const TABLE: &str = "task_runs";
    pub const ID: Column = Column::new(TABLE, "id");
    pub const FLOW_RUN_ID: Column = Column::new(TABLE, "flow_run_id");
    pub const NAME: Column = Column::new(TABLE, "name");
    pub const TAGS: Column = Column::new(TABLE, "tags");
    pub const STATE_TYPE: Column = Column::new(TABLE, "state_type");
    pub const STATE_NAME: Column = Column::new(TABLE, "state_name");
    pub const START_TIME: Column = Column::new(TABLE, "start_time");
}

/// Flow runs whose parent is the task run in the enclosing query.
pub const SUBFLOW_RUNS: Relation = Relation {
    child: flow_runs::TABLE,
    alias: "subflow",
    foreign_key: "parent_task_run_id",
    parent: task_runs::ID,
};
