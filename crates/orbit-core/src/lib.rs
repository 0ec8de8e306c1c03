pub mod config;
pub mod error;
pub mod schedule;
pub mod types;

pub use config::{DatabaseConfig, OrbitConfig, SchedulerConfig};
pub use error::{OrbitError, Result};
pub use schedule::Schedule;
pub use types::{format_ts, new_id, parse_ts, StateType};
