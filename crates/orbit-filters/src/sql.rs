//! SQLite rendering of a compiled [`Predicate`].
//!
//! Operands are never spliced into the text: every value becomes a `?`
//! placeholder with a matching entry in [`SqlFragment::params`]. Table and
//! column names come from the static accessors in [`crate::columns`].

use rusqlite::types::Value as SqlValue;

use crate::predicate::{Predicate, Subquery, Value};

/// A WHERE-clause fragment plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl From<&Value> for SqlValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Integer(i) => SqlValue::Integer(*i),
        }
    }
}

/// Render a predicate; TRUE renders as `1 = 1` so the result can always be
/// dropped after a `WHERE`.
pub fn render(predicate: &Predicate) -> SqlFragment {
    let mut params = Vec::new();
    let mut sql = String::new();
    write_predicate(predicate, &mut sql, &mut params);
    SqlFragment { sql, params }
}

fn placeholders(values: &[Value], params: &mut Vec<SqlValue>) -> String {
    params.extend(values.iter().map(SqlValue::from));
    vec!["?"; values.len()].join(", ")
}

fn write_predicate(p: &Predicate, out: &mut String, params: &mut Vec<SqlValue>) {
    match p {
        Predicate::True => out.push_str("1 = 1"),
        Predicate::And(parts) => {
            out.push('(');
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push_str(" AND ");
                }
                write_predicate(part, out, params);
            }
            out.push(')');
        }
        Predicate::Not(inner) => {
            out.push_str("NOT (");
            write_predicate(inner, out, params);
            out.push(')');
        }
        Predicate::In { values, .. } if values.is_empty() => out.push_str("0 = 1"),
        Predicate::In { column, values } => {
            let marks = placeholders(values, params);
            out.push_str(&format!("{column} IN ({marks})"));
        }
        Predicate::NotIn { values, .. } if values.is_empty() => out.push_str("1 = 1"),
        Predicate::NotIn { column, values } => {
            let marks = placeholders(values, params);
            out.push_str(&format!("({column} IS NULL OR {column} NOT IN ({marks}))"));
        }
        Predicate::IsNull(column) => out.push_str(&format!("{column} IS NULL")),
        Predicate::IsNotNull(column) => out.push_str(&format!("{column} IS NOT NULL")),
        Predicate::Compare { column, op, value } => {
            params.push(value.into());
            out.push_str(&format!("{column} {} ?", op.as_sql()));
        }
        Predicate::JsonContains { column, value } => {
            params.push(value.into());
            out.push_str(&format!(
                "EXISTS (SELECT 1 FROM json_each({column}) WHERE json_each.value = ?)"
            ));
        }
        Predicate::JsonEmpty(column) => {
            out.push_str(&format!("COALESCE(json_array_length({column}), 0) = 0"))
        }
        Predicate::JsonNotEmpty(column) => {
            out.push_str(&format!("COALESCE(json_array_length({column}), 0) > 0"))
        }
        Predicate::Exists(rel) => out.push_str(&format!(
            "EXISTS (SELECT 1 FROM {} AS {} WHERE {}.{} = {})",
            rel.child, rel.alias, rel.alias, rel.foreign_key, rel.parent
        )),
        Predicate::InSubquery { column, subquery } => {
            out.push_str(&format!("{column} IN ("));
            write_subquery(subquery, out, params);
            out.push(')');
        }
    }
}

fn write_subquery(q: &Subquery, out: &mut String, params: &mut Vec<SqlValue>) {
    out.push_str(&format!("SELECT {} FROM {}", q.select, q.from));
    for (table, left, right) in &q.joins {
        out.push_str(&format!(" JOIN {table} ON {left} = {right}"));
    }
    out.push_str(" WHERE ");
    write_predicate(&q.filter, out, params);
}
