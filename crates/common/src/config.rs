use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SsqError};

/// Property prefix owned by the planner; other prefixes belong to the runtime.
pub const PLANNER_PROPERTY_PREFIX: &str = "planner.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Row column that carries the record key (rewritten by `update_rowkey` rekeys).
    pub key_column_name: String,
    /// Pseudo-column exposing the window start of a windowed key.
    pub window_start_column_name: String,
    /// Pseudo-column exposing the window end of a windowed key.
    pub window_end_column_name: String,
    /// Partition count used by sinks that do not set one.
    pub sink_partitions: u32,
    /// Replication factor used by sinks that do not set one.
    pub sink_replicas: u16,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            key_column_name: "ROWKEY".to_string(),
            window_start_column_name: "WINDOWSTART".to_string(),
            window_end_column_name: "WINDOWEND".to_string(),
            sink_partitions: 4,
            sink_replicas: 1,
        }
    }
}

impl PlannerConfig {
    /// Overlay `planner.*` properties onto the defaults.
    ///
    /// Keys outside the `planner.` prefix are ignored. Unknown planner keys and
    /// unparseable values are rejected.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut cfg = Self::default();
        for (key, value) in props {
            let Some(name) = key.strip_prefix(PLANNER_PROPERTY_PREFIX) else {
                continue;
            };
            match name {
                "key.column" => cfg.key_column_name = value.trim().to_string(),
                "window.start.column" => cfg.window_start_column_name = value.trim().to_string(),
                "window.end.column" => cfg.window_end_column_name = value.trim().to_string(),
                "sink.partitions" => cfg.sink_partitions = parse_number(key, value)?,
                "sink.replicas" => cfg.sink_replicas = parse_number(key, value)?,
                _ => {
                    return Err(SsqError::InvalidConfig(format!(
                        "unknown planner property '{key}'"
                    )));
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (what, name) in [
            ("key column", &self.key_column_name),
            ("window start column", &self.window_start_column_name),
            ("window end column", &self.window_end_column_name),
        ] {
            if name.is_empty() {
                return Err(SsqError::InvalidConfig(format!("{what} name is empty")));
            }
        }
        if self.window_start_column_name == self.window_end_column_name {
            return Err(SsqError::InvalidConfig(format!(
                "window start and end columns share the name '{}'",
                self.window_start_column_name
            )));
        }
        if self.sink_partitions == 0 {
            return Err(SsqError::InvalidConfig(
                "sink partitions must be > 0".to_string(),
            ));
        }
        if self.sink_replicas == 0 {
            return Err(SsqError::InvalidConfig(
                "sink replicas must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        SsqError::InvalidConfig(format!("property '{key}' expects a number, got '{value}'"))
    })
}
