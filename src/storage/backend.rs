//! Storage traits consumed by the alerting engine
//!
//! The engine talks to four logical stores. They are separate traits so a
//! backend can be read as four small contracts, and are bundled into
//! [`StorageBackend`] which is what the engine actually holds
//! (`Arc<dyn StorageBackend>`).
//!
//! ## Consistency
//!
//! Many evaluators access the store concurrently, but each one only touches
//! the rows of its own rule instance. Backends must provide read-your-writes
//! per row; no cross-row locking is required.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{
    Alarm, MetricSample, NewAlarm, NewPlant, NewPlantType, Plant, PlantType, RuleInstance,
    Severity,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Plant profiles and plant type profiles
#[async_trait]
pub trait PlantStore: Send + Sync {
    async fn get_plant(&self, id: i64) -> StorageResult<Option<Plant>>;

    async fn get_plant_type(&self, id: i64) -> StorageResult<Option<PlantType>>;

    async fn insert_plant_type(&self, plant_type: NewPlantType) -> StorageResult<PlantType>;

    async fn insert_plant(&self, plant: NewPlant) -> StorageResult<Plant>;

    /// Returns whether a plant was removed
    ///
    /// Rule instances of the plant are left alone; their evaluators notice the
    /// missing plant on their next tick.
    async fn delete_plant(&self, id: i64) -> StorageResult<bool>;
}

/// Time series of sensor readings
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// The sample with the greatest timestamp for the sensor
    async fn latest_sample(&self, sensor_id: i64) -> StorageResult<Option<MetricSample>>;

    async fn insert_sample(&self, sample: MetricSample) -> StorageResult<()>;
}

/// Persisted rule instances ("tasks")
#[async_trait]
pub trait RuleInstanceStore: Send + Sync {
    /// All instances, ordered by id
    async fn list_rule_instances(&self) -> StorageResult<Vec<RuleInstance>>;

    async fn list_rule_instances_for_plant(&self, plant_id: i64)
    -> StorageResult<Vec<RuleInstance>>;

    async fn get_rule_instance(&self, id: i64) -> StorageResult<Option<RuleInstance>>;

    async fn create_rule_instance(
        &self,
        rule_kind: &str,
        target_plant_id: i64,
    ) -> StorageResult<RuleInstance>;

    /// Returns whether an instance was removed
    async fn delete_rule_instance(&self, id: i64) -> StorageResult<bool>;

    async fn set_raised(&self, id: i64, raised: bool) -> StorageResult<()>;
}

/// Active alarms
#[async_trait]
pub trait AlarmStore: Send + Sync {
    async fn find_alarm(&self, rule_instance_id: i64) -> StorageResult<Option<Alarm>>;

    /// Create the alarm of a rule instance
    ///
    /// A rule instance owns at most one alarm. If it already has one, that
    /// alarm is returned unchanged.
    async fn create_alarm(&self, alarm: NewAlarm) -> StorageResult<Alarm>;

    /// Delete the alarm of a rule instance, returns whether one existed
    async fn delete_alarm(&self, rule_instance_id: i64) -> StorageResult<bool>;

    /// Alarms of all rule instances targeting the plant, oldest first,
    /// optionally restricted to one severity
    async fn list_alarms_for_plant(
        &self,
        plant_id: i64,
        severity: Option<Severity>,
    ) -> StorageResult<Vec<Alarm>>;
}

/// A complete storage backend
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// evaluator task.
#[async_trait]
pub trait StorageBackend: PlantStore + MetricStore + RuleInstanceStore + AlarmStore {
    /// Lightweight operation verifying the backend is usable
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
