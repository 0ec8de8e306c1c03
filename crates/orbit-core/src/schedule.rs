//! Recurrence rules attached to deployments.
//!
//! A [`Schedule`] only answers one question: which instants inside a window
//! does it fire at? Everything about persisting those instants lives in the
//! store and the scheduler.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrbitError, Result};

/// Upper bound for interval schedules (100 years).
const MAX_INTERVAL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Defines when a deployment should produce runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire every `every_secs` seconds on a grid aligned to `anchor`
    /// (the Unix epoch when unset).
    Interval {
        every_secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<DateTime<Utc>>,
    },

    /// Fire every day at HH:MM UTC.
    Daily { hour: u8, minute: u8 },

    /// Fire on a weekday (0 = Monday … 6 = Sunday) at HH:MM UTC.
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Standard 5-field cron expression, or 6-field with seconds.
    Cron { expression: String },
}

impl Schedule {
    /// Reject rules that can never fire or cannot be evaluated.
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Interval { every_secs, .. } => {
                if *every_secs == 0 || *every_secs > MAX_INTERVAL_SECS {
                    return Err(OrbitError::InvalidSchedule(format!(
                        "interval must be between 1 and {MAX_INTERVAL_SECS} seconds, got {every_secs}"
                    )));
                }
            }
            Schedule::Daily { hour, minute } => check_clock(*hour, *minute)?,
            Schedule::Weekly { day, hour, minute } => {
                if *day > 6 {
                    return Err(OrbitError::InvalidSchedule(format!(
                        "weekday must be 0-6, got {day}"
                    )));
                }
                check_clock(*hour, *minute)?;
            }
            Schedule::Cron { expression } => {
                parse_cron(expression)?;
            }
        }
        Ok(())
    }

    /// Every instant `t` with `start <= t <= end` at which the rule fires,
    /// ascending, capped at `max` entries.
    ///
    /// Deterministic for a given window: calling it again with an
    /// overlapping window yields the same instants for the overlap.
    pub fn fire_times(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<DateTime<Utc>>> {
        self.validate()?;
        if max == 0 || end < start {
            return Ok(Vec::new());
        }

        let times = match self {
            Schedule::Cron { expression } => {
                let cron = parse_cron(expression)?;
                // `after` is exclusive and second-granular; step back a second
                // so an instant equal to `start` is not lost.
                cron.after(&(start - Duration::seconds(1)))
                    .skip_while(|t| *t < start)
                    .take_while(|t| *t <= end)
                    .take(max)
                    .collect()
            }
            _ => {
                let step = self.step();
                std::iter::successors(self.first_at_or_after(start), |t| {
                    t.checked_add_signed(step)
                })
                .take_while(|t| *t <= end)
                .take(max)
                .collect()
            }
        };
        Ok(times)
    }

    /// Distance between consecutive fire times of the fixed-period variants.
    fn step(&self) -> Duration {
        match self {
            Schedule::Interval { every_secs, .. } => Duration::seconds(*every_secs as i64),
            Schedule::Daily { .. } => Duration::days(1),
            Schedule::Weekly { .. } => Duration::days(7),
            Schedule::Cron { .. } => Duration::zero(),
        }
    }

    /// First fire time at or after `from` for the fixed-period variants.
    fn first_at_or_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval { every_secs, anchor } => {
                let anchor = anchor.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let every_us = (*every_secs as i64).checked_mul(1_000_000)?;
                let diff_us = (from - anchor).num_microseconds()?;
                let steps = diff_us.div_euclid(every_us)
                    + i64::from(diff_us.rem_euclid(every_us) != 0);
                let candidate = anchor
                    .checked_add_signed(Duration::microseconds(steps.checked_mul(every_us)?))?;
                // Sub-microsecond remainders are truncated above.
                if candidate >= from {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::microseconds(every_us))
                }
            }
            Schedule::Daily { hour, minute } => {
                let candidate = at_clock(from, 0, *hour, *minute)?;
                if candidate >= from {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::days(1))
                }
            }
            Schedule::Weekly { day, hour, minute } => {
                // ISO numbering: 0 = Monday, matching `num_days_from_monday`.
                let today = from.weekday().num_days_from_monday() as i64;
                let days_ahead = (i64::from(*day) - today).rem_euclid(7);
                let candidate = at_clock(from, days_ahead, *hour, *minute)?;
                if candidate >= from {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::days(7))
                }
            }
            Schedule::Cron { .. } => None,
        }
    }
}

/// `from`'s date shifted by `days_ahead`, at HH:MM:00 UTC.
fn at_clock(from: DateTime<Utc>, days_ahead: i64, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    let date = from.date_naive() + Duration::days(days_ahead);
    let naive = date.and_hms_opt(u32::from(hour), u32::from(minute), 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn check_clock(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(OrbitError::InvalidSchedule(format!(
            "time of day out of range: {hour:02}:{minute:02}"
        )));
    }
    Ok(())
}

/// The `cron` crate wants 6 fields (with seconds); accept the usual 5.
fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(&normalize_cron(expression)).map_err(|e| {
        OrbitError::InvalidSchedule(format!("invalid cron expression '{expression}': {e}"))
    })
}
