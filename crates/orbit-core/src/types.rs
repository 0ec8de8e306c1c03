use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrbitError, Result};

/// New primary key for any persisted entity.
///
/// UUIDv7 embeds a millisecond timestamp, so ids sort roughly by creation
/// time and their hyphenated text form sorts the same way as the bytes.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// Canonical text form for timestamps in storage and predicates.
///
/// Fixed microsecond precision with a `Z` suffix keeps every value the same
/// width, so string comparison in SQL matches chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrbitError::InvalidTimestamp(format!("{s}: {e}")))
}

/// Coarse lifecycle bucket of a flow run or task run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateType {
    Scheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Scheduled => "SCHEDULED",
            StateType::Pending => "PENDING",
            StateType::Running => "RUNNING",
            StateType::Completed => "COMPLETED",
            StateType::Failed => "FAILED",
            StateType::Cancelled => "CANCELLED",
        }
    }

    /// Display name given to a state of this type when none is supplied.
    pub fn default_name(&self) -> &'static str {
        match self {
            StateType::Scheduled => "Scheduled",
            StateType::Pending => "Pending",
            StateType::Running => "Running",
            StateType::Completed => "Completed",
            StateType::Failed => "Failed",
            StateType::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StateType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(StateType::Scheduled),
            "PENDING" => Ok(StateType::Pending),
            "RUNNING" => Ok(StateType::Running),
            "COMPLETED" => Ok(StateType::Completed),
            "FAILED" => Ok(StateType::Failed),
            "CANCELLED" => Ok(StateType::Cancelled),
            other => Err(format!("unknown state type: {other}")),
        }
    }
}
