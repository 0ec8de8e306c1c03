//! Operator sets, one per field semantic.
//!
//! Each leaf holds optional operator fields and compiles them against a
//! field accessor supplied by the enclosing entity filter. A leaf never
//! knows which table or column it is about, so the same `TagSet` serves
//! flows, flow runs, task runs and deployments.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::predicate::{Column, CompareOp, Predicate, Relation, Value};

/// A set of operators that compiles against one field.
pub trait Leaf {
    /// What the operators are evaluated against.
    type Field;

    /// One predicate per operator that is set, in declaration order.
    fn clauses(&self, field: &Self::Field) -> Vec<Predicate>;

    /// AND of [`Leaf::clauses`]; TRUE when no operator is set.
    fn compile(&self, field: &Self::Field) -> Predicate {
        Predicate::and(self.clauses(field))
    }
}

/// Sorted, de-duplicated operands so equal filters render identically.
fn value_set<T: Clone + Into<Value>>(values: &[T]) -> Vec<Value> {
    values
        .iter()
        .cloned()
        .map(Into::into)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn null_check(column: Column, is_null: bool) -> Predicate {
    if is_null {
        Predicate::IsNull(column)
    } else {
        Predicate::IsNotNull(column)
    }
}

// ---------------------------------------------------------------------------
// membership / exclusion
// ---------------------------------------------------------------------------

/// `any_`: value is one of the set. `not_any_`: value is none of the set,
/// which a NULL value never is. An empty list constrains nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "T: Deserialize<'de>"))]
pub struct AnyOf<T> {
    #[serde(rename = "any_", default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<T>>,
    #[serde(rename = "not_any_", default, skip_serializing_if = "Option::is_none")]
    pub not_any: Option<Vec<T>>,
}

impl<T> Default for AnyOf<T> {
    fn default() -> Self {
        Self {
            any: None,
            not_any: None,
        }
    }
}

impl<T> AnyOf<T> {
    pub fn any(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            any: Some(values.into_iter().collect()),
            not_any: None,
        }
    }

    pub fn not_any(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            any: None,
            not_any: Some(values.into_iter().collect()),
        }
    }

    pub fn and_not_any(mut self, values: impl IntoIterator<Item = T>) -> Self {
        self.not_any = Some(values.into_iter().collect());
        self
    }
}

impl<T: Clone + Into<Value>> Leaf for AnyOf<T> {
    type Field = Column;

    fn clauses(&self, column: &Column) -> Vec<Predicate> {
        let mut out = Vec::new();
        if let Some(values) = self.any.as_deref().filter(|v| !v.is_empty()) {
            out.push(Predicate::In {
                column: *column,
                values: value_set(values),
            });
        }
        if let Some(values) = self.not_any.as_deref().filter(|v| !v.is_empty()) {
            out.push(Predicate::NotIn {
                column: *column,
                values: value_set(values),
            });
        }
        out
    }
}

/// Membership on a nullable column, plus `is_null_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "T: Deserialize<'de>"))]
pub struct NullableAnyOf<T> {
    #[serde(rename = "any_", default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<T>>,
    #[serde(rename = "is_null_", default, skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,
}

impl<T> Default for NullableAnyOf<T> {
    fn default() -> Self {
        Self {
            any: None,
            is_null: None,
        }
    }
}

impl<T> NullableAnyOf<T> {
    pub fn any(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            any: Some(values.into_iter().collect()),
            is_null: None,
        }
    }

    pub fn null_check(is_null: bool) -> Self {
        Self {
            any: None,
            is_null: Some(is_null),
        }
    }
}

impl<T: Clone + Into<Value>> Leaf for NullableAnyOf<T> {
    type Field = Column;

    fn clauses(&self, column: &Column) -> Vec<Predicate> {
        let mut out = Vec::new();
        if let Some(values) = self.any.as_deref().filter(|v| !v.is_empty()) {
            out.push(Predicate::In {
                column: *column,
                values: value_set(values),
            });
        }
        if let Some(is_null) = self.is_null {
            out.push(null_check(*column, is_null));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// superset / emptiness on tag sets
// ---------------------------------------------------------------------------

/// `all_`: the entity's tags are a superset of the list.
/// `is_null_`: true selects untagged entities, false tagged ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagSet {
    #[serde(rename = "all_", default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    #[serde(rename = "is_null_", default, skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,
}

impl TagSet {
    pub fn all<S: Into<String>>(tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            all: Some(tags.into_iter().map(Into::into).collect()),
            is_null: None,
        }
    }

    pub fn null_check(is_null: bool) -> Self {
        Self {
            all: None,
            is_null: Some(is_null),
        }
    }

    pub fn and_null_check(mut self, is_null: bool) -> Self {
        self.is_null = Some(is_null);
        self
    }
}

impl Leaf for TagSet {
    type Field = Column;

    fn clauses(&self, column: &Column) -> Vec<Predicate> {
        let mut out = Vec::new();
        if let Some(tags) = &self.all {
            // One containment check per distinct tag: order and repeats in
            // the request cannot change the result.
            let distinct: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
            out.extend(distinct.into_iter().map(|tag| Predicate::JsonContains {
                column: *column,
                value: Value::from(tag),
            }));
        }
        match self.is_null {
            Some(true) => out.push(Predicate::JsonEmpty(*column)),
            Some(false) => out.push(Predicate::JsonNotEmpty(*column)),
            None => {}
        }
        out
    }
}

// ---------------------------------------------------------------------------
// range
// ---------------------------------------------------------------------------

/// Inclusive time bounds, plus an optional null-check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
    #[serde(rename = "before_", default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    #[serde(rename = "after_", default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(rename = "is_null_", default, skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,
}

impl TimeRange {
    pub fn before(ts: DateTime<Utc>) -> Self {
        Self {
            before: Some(ts),
            ..Default::default()
        }
    }

    pub fn after(ts: DateTime<Utc>) -> Self {
        Self {
            after: Some(ts),
            ..Default::default()
        }
    }

    /// `after <= value <= before`.
    pub fn between(after: DateTime<Utc>, before: DateTime<Utc>) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
            is_null: None,
        }
    }

    pub fn null_check(is_null: bool) -> Self {
        Self {
            is_null: Some(is_null),
            ..Default::default()
        }
    }
}

impl Leaf for TimeRange {
    type Field = Column;

    fn clauses(&self, column: &Column) -> Vec<Predicate> {
        let mut out = Vec::new();
        if let Some(before) = self.before {
            out.push(Predicate::Compare {
                column: *column,
                op: CompareOp::Lte,
                value: before.into(),
            });
        }
        if let Some(after) = self.after {
            out.push(Predicate::Compare {
                column: *column,
                op: CompareOp::Gte,
                value: after.into(),
            });
        }
        if let Some(is_null) = self.is_null {
            out.push(null_check(*column, is_null));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// equality / existence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "T: Deserialize<'de>"))]
pub struct Equals<T> {
    #[serde(rename = "eq_", default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<T>,
}

impl<T> Default for Equals<T> {
    fn default() -> Self {
        Self { eq: None }
    }
}

impl<T> Equals<T> {
    pub fn new(value: T) -> Self {
        Self { eq: Some(value) }
    }
}

impl<T: Clone + Into<Value>> Leaf for Equals<T> {
    type Field = Column;

    fn clauses(&self, column: &Column) -> Vec<Predicate> {
        self.eq
            .iter()
            .map(|v| Predicate::eq(*column, v.clone()))
            .collect()
    }
}

/// `exists_`: the entity has (true) or lacks (false) related child rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exists {
    #[serde(rename = "exists_", default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl Exists {
    pub fn new(exists: bool) -> Self {
        Self {
            exists: Some(exists),
        }
    }
}

impl Leaf for Exists {
    type Field = Relation;

    fn clauses(&self, relation: &Relation) -> Vec<Predicate> {
        match self.exists {
            Some(true) => vec![Predicate::Exists(*relation)],
            Some(false) => vec![Predicate::not(Predicate::Exists(*relation))],
            None => Vec::new(),
        }
    }
}
