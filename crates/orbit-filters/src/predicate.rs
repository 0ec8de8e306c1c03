use chrono::{DateTime, Utc};
use orbit_core::{format_ts, StateType};
use uuid::Uuid;

/// A column of one of the entity tables, always rendered table-qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: &'static str,
    pub name: &'static str,
}

impl Column {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self { table, name }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

/// Scalar operand bound into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Text(String),
    Integer(i64),
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(format_ts(v))
    }
}

impl From<StateType> for Value {
    fn from(v: StateType) -> Self {
        Value::Text(v.as_str().to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
        }
    }
}

/// A child table pointing back at its parent row: `child.foreign_key = parent`.
///
/// `alias` lets the child table appear inside a query that already uses the
/// same table under its own name (a task run's subflow runs live in
/// `flow_runs`, which may also be the outer table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relation {
    pub child: &'static str,
    pub alias: &'static str,
    pub foreign_key: &'static str,
    pub parent: Column,
}

/// `SELECT select FROM from [JOIN table ON left = right]... WHERE filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub select: Column,
    pub from: &'static str,
    pub joins: Vec<(&'static str, Column, Column)>,
    pub filter: Box<Predicate>,
}

/// Backend-neutral boolean selection rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Selects everything; the identity element of [`Predicate::and`].
    True,
    And(Vec<Predicate>),
    Not(Box<Predicate>),
    In { column: Column, values: Vec<Value> },
    NotIn { column: Column, values: Vec<Value> },
    IsNull(Column),
    IsNotNull(Column),
    Compare { column: Column, op: CompareOp, value: Value },
    /// The JSON array stored in `column` contains `value`.
    JsonContains { column: Column, value: Value },
    /// The JSON array in `column` is empty (or the column is NULL).
    JsonEmpty(Column),
    JsonNotEmpty(Column),
    /// At least one child row exists for the relation.
    Exists(Relation),
    /// `column` is one of the values produced by the subquery.
    InSubquery { column: Column, subquery: Subquery },
}

impl Predicate {
    /// Conjunction that flattens nested ANDs and drops TRUE members.
    ///
    /// No members left means TRUE; a single member is returned as is.
    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Predicate::True => {}
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::True,
            1 => flat.remove(0),
            _ => Predicate::And(flat),
        }
    }

    pub fn not(inner: Predicate) -> Predicate {
        Predicate::Not(Box::new(inner))
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column,
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }
}
