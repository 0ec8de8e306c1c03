use serde::{Deserialize, Serialize};

use crate::columns::{deployments, flow_runs, flows, task_runs};
use crate::error::Result;
use crate::filters::{DeploymentFilter, Filter, FlowFilter, FlowRunFilter, TaskRunFilter};
use crate::predicate::{Column, Predicate, Subquery};

/// Request-scoped criteria over the four entities.
///
/// Applied to one target entity, its own filter is used directly and the
/// other three reach it through the flow / flow run / task run / deployment
/// relationships. Absent (or empty) filters add nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<FlowFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_runs: Option<FlowRunFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_runs: Option<TaskRunFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployments: Option<DeploymentFilter>,
}

fn compiled<F: Filter>(filter: &Option<F>) -> Predicate {
    filter.as_ref().map_or(Predicate::True, Filter::predicate)
}

/// `column IN (SELECT select FROM from [JOIN ...] WHERE filter)`, or TRUE when
/// the filter selects everything.
fn in_subquery(
    column: Column,
    select: Column,
    from: &'static str,
    joins: Vec<(&'static str, Column, Column)>,
    filter: Predicate,
) -> Predicate {
    if filter.is_true() {
        return Predicate::True;
    }
    Predicate::InSubquery {
        column,
        subquery: Subquery {
            select,
            from,
            joins,
            filter: Box::new(filter),
        },
    }
}

impl FilterCriteria {
    /// Parse criteria from their JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Flows matching `flows`, having a flow run that matches `flow_runs`
    /// (with a task run matching `task_runs`) and a deployment matching
    /// `deployments`.
    pub fn for_flows(&self) -> Predicate {
        let runs = compiled(&self.flow_runs);
        let tasks = compiled(&self.task_runs);
        let joins = if tasks.is_true() {
            Vec::new()
        } else {
            vec![(task_runs::TABLE, task_runs::FLOW_RUN_ID, flow_runs::ID)]
        };
        Predicate::and([
            compiled(&self.flows),
            in_subquery(
                flows::ID,
                flow_runs::FLOW_ID,
                flow_runs::TABLE,
                joins,
                Predicate::and([runs, tasks]),
            ),
            in_subquery(
                flows::ID,
                deployments::FLOW_ID,
                deployments::TABLE,
                Vec::new(),
                compiled(&self.deployments),
            ),
        ])
    }

    /// Flow runs matching `flow_runs`, whose flow matches `flows`, owning a
    /// task run that matches `task_runs`, created by a deployment matching
    /// `deployments`.
    pub fn for_flow_runs(&self) -> Predicate {
        Predicate::and([
            compiled(&self.flow_runs),
            in_subquery(
                flow_runs::FLOW_ID,
                flows::ID,
                flows::TABLE,
                Vec::new(),
                compiled(&self.flows),
            ),
            in_subquery(
                flow_runs::ID,
                task_runs::FLOW_RUN_ID,
                task_runs::TABLE,
                Vec::new(),
                compiled(&self.task_runs),
            ),
            in_subquery(
                flow_runs::DEPLOYMENT_ID,
                deployments::ID,
                deployments::TABLE,
                Vec::new(),
                compiled(&self.deployments),
            ),
        ])
    }

    /// Task runs matching `task_runs` whose flow run matches `flow_runs`, and
    /// whose flow and deployment match `flows` and `deployments`.
    pub fn for_task_runs(&self) -> Predicate {
        let flow = compiled(&self.flows);
        let deployment = compiled(&self.deployments);
        let mut joins = Vec::new();
        if !flow.is_true() {
            joins.push((flows::TABLE, flows::ID, flow_runs::FLOW_ID));
        }
        if !deployment.is_true() {
            joins.push((deployments::TABLE, deployments::ID, flow_runs::DEPLOYMENT_ID));
        }
        Predicate::and([
            compiled(&self.task_runs),
            in_subquery(
                task_runs::FLOW_RUN_ID,
                flow_runs::ID,
                flow_runs::TABLE,
                joins,
                Predicate::and([compiled(&self.flow_runs), flow, deployment]),
            ),
        ])
    }

    /// Deployments matching `deployments` whose flow matches `flows` and
    /// that own a flow run matching `flow_runs` (with a task run matching
    /// `task_runs`).
    pub fn for_deployments(&self) -> Predicate {
        let runs = compiled(&self.flow_runs);
        let tasks = compiled(&self.task_runs);
        let joins = if tasks.is_true() {
            Vec::new()
        } else {
            vec![(task_runs::TABLE, task_runs::FLOW_RUN_ID, flow_runs::ID)]
        };
        Predicate::and([
            compiled(&self.deployments),
            in_subquery(
                deployments::FLOW_ID,
                flows::ID,
                flows::TABLE,
                Vec::new(),
                compiled(&self.flows),
            ),
            in_subquery(
                deployments::ID,
                flow_runs::DEPLOYMENT_ID,
                flow_runs::TABLE,
                joins,
                Predicate::and([runs, tasks]),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::{AnyOf, Equals, TagSet};

    #[test]
    fn empty_criteria_select_everything() {
        let criteria = FilterCriteria::default();
        assert!(criteria.for_flows().is_true());
        assert!(criteria.for_flow_runs().is_true());
        assert!(criteria.for_task_runs().is_true());
        assert!(criteria.for_deployments().is_true());
    }

    #[test]
    fn empty_entity_filters_add_no_subqueries() {
        let criteria = FilterCriteria::from_json(
            r#"{"flows":{},"flow_runs":{},"task_runs":{},"deployments":{}}"#,
        )
        .unwrap();
        assert!(criteria.flows.is_some() && criteria.deployments.is_some());
        assert!(criteria.for_deployments().is_true());
        assert!(criteria.for_task_runs().is_true());
    }

    #[test]
    fn own_filter_only_stays_local() {
        let criteria = FilterCriteria {
            deployments: Some(DeploymentFilter {
                is_schedule_active: Some(Equals::new(true)),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            criteria.for_deployments(),
            Predicate::eq(deployments::IS_SCHEDULE_ACTIVE, true)
        );
    }

    #[test]
    fn flow_filter_reaches_deployments_through_flow_id() {
        let criteria = FilterCriteria {
            flows: Some(FlowFilter {
                name: Some(AnyOf::any(["etl".to_string()])),
                ..Default::default()
            }),
            ..Default::default()
        };
        match criteria.for_deployments() {
            Predicate::InSubquery { column, subquery } => {
                assert_eq!(column, deployments::FLOW_ID);
                assert_eq!(subquery.select, flows::ID);
                assert_eq!(subquery.from, flows::TABLE);
                assert!(subquery.joins.is_empty());
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn task_run_filter_joins_through_flow_runs() {
        let criteria = FilterCriteria {
            task_runs: Some(TaskRunFilter {
                tags: Some(TagSet::all(["db"])),
                ..Default::default()
            }),
            ..Default::default()
        };
        match criteria.for_flows() {
            Predicate::InSubquery { subquery, .. } => {
                assert_eq!(subquery.from, flow_runs::TABLE);
                assert_eq!(
                    subquery.joins,
                    vec![(task_runs::TABLE, task_runs::FLOW_RUN_ID, flow_runs::ID)]
                );
            }
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let err = FilterCriteria::from_json(r#"{"workers":{}}"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid filter"));
    }
}
