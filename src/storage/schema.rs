//! Row types shared by all storage backends
//!
//! ## Ownership
//!
//! Plants, plant types and metric samples are written by the (external)
//! registration and ingestion endpoints; the alerting engine only reads them.
//! Rule instances and alarms are owned by the engine: it creates them when a
//! plant is registered, and deletes them once their plant is gone.
//!
//! All timestamps are UTC. The SQLite backend stores them as Unix
//! milliseconds.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordinal classification of an alarm
///
/// Lower values are more urgent. The numeric value is what gets persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    Problem = 0,
    Warning = 1,
    #[default]
    Recommendation = 2,
}

impl Severity {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.as_u8()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Severity::Problem),
            1 => Ok(Severity::Warning),
            2 => Ok(Severity::Recommendation),
            other => Err(format!("unknown severity ordinal: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Problem => write!(f, "problem"),
            Severity::Warning => write!(f, "warning"),
            Severity::Recommendation => write!(f, "recommendation"),
        }
    }
}

/// Static care profile of a plant type
///
/// Threshold rules read their limits from here, the transplantation rule its
/// schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantType {
    pub id: i64,
    pub name: String,

    /// Degrees Celsius
    pub temperature_max: f64,
    pub temperature_min: f64,

    /// Lux
    pub light_max: f64,
    pub light_min: f64,

    /// Percent volumetric water content
    pub soil_moisture_max: f64,
    pub soil_moisture_min: f64,

    /// Month the plant should be transplanted in (1 = January)
    pub transplantation_month: u32,

    /// Years between two transplantations
    pub transplantation_interval: u32,
}

/// Insert payload for [`PlantType`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlantType {
    pub name: String,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub light_max: f64,
    pub light_min: f64,
    pub soil_moisture_max: f64,
    pub soil_moisture_min: f64,
    pub transplantation_month: u32,
    pub transplantation_interval: u32,
}

impl NewPlantType {
    pub(crate) fn with_id(self, id: i64) -> PlantType {
        PlantType {
            id,
            name: self.name,
            temperature_max: self.temperature_max,
            temperature_min: self.temperature_min,
            light_max: self.light_max,
            light_min: self.light_min,
            soil_moisture_max: self.soil_moisture_max,
            soil_moisture_min: self.soil_moisture_min,
            transplantation_month: self.transplantation_month,
            transplantation_interval: self.transplantation_interval,
        }
    }
}

/// A monitored plant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    pub plant_type_id: i64,

    /// Sensor placed in the pot, if any
    pub sensor_id: Option<i64>,

    pub last_transplantation_year: i32,
}

/// Insert payload for [`Plant`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlant {
    pub name: String,
    pub plant_type_id: i64,
    pub sensor_id: Option<i64>,
    pub last_transplantation_year: i32,
}

impl NewPlant {
    pub(crate) fn with_id(self, id: i64) -> Plant {
        Plant {
            id,
            name: self.name,
            plant_type_id: self.plant_type_id,
            sensor_id: self.sensor_id,
            last_transplantation_year: self.last_transplantation_year,
        }
    }
}

/// One reading pushed by a sensor
///
/// Every channel is optional, a sensor may report only part of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: i64,
    pub temperature: Option<f64>,
    pub light: Option<f64>,
    pub soil_moisture: Option<f64>,
}

/// Persisted binding of one rule kind to one plant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInstance {
    pub id: i64,

    /// Tag resolved through the rule factory (e.g. `"temperature_max"`)
    pub rule_kind: String,

    pub target_plant_id: i64,

    /// Whether this instance currently owns an alarm
    pub raised: bool,
}

/// An active alarm, at most one per rule instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: i64,
    pub rule_instance_id: i64,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`Alarm`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlarm {
    pub rule_instance_id: i64,
    pub severity: Severity,
    pub message: String,
}
