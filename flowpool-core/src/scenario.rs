//! Run-level configuration bundle.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{FlowConfig, ResourcesConfig, Schema};

/// Settings for a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for the run's random source.
    #[serde(default)]
    pub seed: u64,
    /// Simulated minutes after which the run stops.
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    /// Calendar datetime corresponding to simulated time zero.
    #[serde(default = "default_start")]
    pub start_datetime: NaiveDateTime,
    /// Keep a per-step execution trace in the report.
    #[serde(default = "default_true")]
    pub record_trace: bool,
}

fn default_horizon() -> f64 {
    1440.0
}

fn default_start() -> NaiveDateTime {
    // 2024-01-01 is a Monday, which keeps weekday-based shifts easy to read.
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn default_true() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            horizon: default_horizon(),
            start_datetime: default_start(),
            record_trace: true,
        }
    }
}

/// Everything a run needs: settings, flows, resources and schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Run settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Process definitions.
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
    /// Resource pools and queues.
    #[serde(default)]
    pub resources: ResourcesConfig,
    /// Table schema.
    #[serde(default)]
    pub schema: Schema,
}

impl Scenario {
    /// Deserializes a scenario from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
