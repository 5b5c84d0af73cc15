//! Rules comparing the latest sensor sample against a static limit

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::trace;

use super::{Rule, RuleContext, RuleError};
use crate::storage::{
    MetricSample, MetricStore, PlantType, Severity, StorageBackend, StorageResult,
};

/// Which side of the limit is unsafe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Triggers when the reading is strictly above the limit
    Max,
    /// Triggers when the reading is strictly below the limit
    Min,
}

/// The six threshold rule kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    TemperatureMax,
    TemperatureMin,
    LightMax,
    LightMin,
    SoilMoistureMax,
    SoilMoistureMin,
}

impl ThresholdKind {
    pub const ALL: [ThresholdKind; 6] = [
        ThresholdKind::TemperatureMax,
        ThresholdKind::TemperatureMin,
        ThresholdKind::LightMax,
        ThresholdKind::LightMin,
        ThresholdKind::SoilMoistureMax,
        ThresholdKind::SoilMoistureMin,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ThresholdKind::TemperatureMax => "temperature_max",
            ThresholdKind::TemperatureMin => "temperature_min",
            ThresholdKind::LightMax => "light_max",
            ThresholdKind::LightMin => "light_min",
            ThresholdKind::SoilMoistureMax => "soil_moisture_max",
            ThresholdKind::SoilMoistureMin => "soil_moisture_min",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            ThresholdKind::TemperatureMax
            | ThresholdKind::LightMax
            | ThresholdKind::SoilMoistureMax => Direction::Max,
            ThresholdKind::TemperatureMin
            | ThresholdKind::LightMin
            | ThresholdKind::SoilMoistureMin => Direction::Min,
        }
    }

    /// The limit this kind reads from a plant type profile
    pub fn limit(self, plant_type: &PlantType) -> f64 {
        match self {
            ThresholdKind::TemperatureMax => plant_type.temperature_max,
            ThresholdKind::TemperatureMin => plant_type.temperature_min,
            ThresholdKind::LightMax => plant_type.light_max,
            ThresholdKind::LightMin => plant_type.light_min,
            ThresholdKind::SoilMoistureMax => plant_type.soil_moisture_max,
            ThresholdKind::SoilMoistureMin => plant_type.soil_moisture_min,
        }
    }

    /// The sample channel this kind looks at
    pub fn reading(self, sample: &MetricSample) -> Option<f64> {
        match self {
            ThresholdKind::TemperatureMax | ThresholdKind::TemperatureMin => sample.temperature,
            ThresholdKind::LightMax | ThresholdKind::LightMin => sample.light,
            ThresholdKind::SoilMoistureMax | ThresholdKind::SoilMoistureMin => {
                sample.soil_moisture
            }
        }
    }

    /// Strict comparison: a reading equal to the limit is fine
    pub fn is_violated(self, reading: f64, limit: f64) -> bool {
        match self.direction() {
            Direction::Max => reading > limit,
            Direction::Min => reading < limit,
        }
    }

    fn channel(self) -> &'static str {
        match self {
            ThresholdKind::TemperatureMax | ThresholdKind::TemperatureMin => "temperature",
            ThresholdKind::LightMax | ThresholdKind::LightMin => "light",
            ThresholdKind::SoilMoistureMax | ThresholdKind::SoilMoistureMin => "soil moisture",
        }
    }
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Threshold rule for one plant and one channel
pub struct ThresholdRule {
    kind: ThresholdKind,
    plant_id: i64,
    sensor_id: Option<i64>,
    limit: f64,
    message: String,
    store: Arc<dyn StorageBackend>,
}

impl fmt::Debug for ThresholdRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdRule")
            .field("kind", &self.kind)
            .field("plant_id", &self.plant_id)
            .field("sensor_id", &self.sensor_id)
            .field("limit", &self.limit)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl ThresholdRule {
    /// Resolve the plant type and cache the limit and the plant's sensor
    pub async fn create_from_db(kind: ThresholdKind, ctx: RuleContext) -> Result<Self, RuleError> {
        let plant_type = ctx.plant_type().await?;
        let limit = kind.limit(&plant_type);

        let (relation, bound) = match kind.direction() {
            Direction::Max => ("above", "maximum"),
            Direction::Min => ("below", "minimum"),
        };
        let message = format!(
            "{}: {} is {relation} the safe {bound} of {limit}",
            ctx.plant.name,
            kind.channel()
        );

        Ok(Self {
            kind,
            plant_id: ctx.plant.id,
            sensor_id: ctx.plant.sensor_id,
            limit,
            message,
            store: ctx.store,
        })
    }

    pub fn threshold_kind(&self) -> ThresholdKind {
        self.kind
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }
}

#[async_trait]
impl Rule for ThresholdRule {
    fn kind(&self) -> &str {
        self.kind.tag()
    }

    fn severity(&self) -> Severity {
        Severity::Problem
    }

    fn message(&self) -> &str {
        &self.message
    }

    async fn check(&mut self, _now: DateTime<Utc>) -> StorageResult<bool> {
        let Some(sensor_id) = self.sensor_id else {
            trace!("plant {} has no sensor, nothing to compare", self.plant_id);
            return Ok(false);
        };

        let Some(sample) = self.store.latest_sample(sensor_id).await? else {
            trace!("no sample for sensor {sensor_id} yet");
            return Ok(false);
        };

        let Some(reading) = self.kind.reading(&sample) else {
            trace!("sample of sensor {sensor_id} carries no {}", self.kind.channel());
            return Ok(false);
        };

        let violated = self.kind.is_violated(reading, self.limit);
        trace!(
            "{}: {reading} vs {} → {violated}",
            self.kind, self.limit
        );

        Ok(violated)
    }
}
