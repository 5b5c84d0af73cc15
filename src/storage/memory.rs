//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the hub without a database (`"backend": "none"`)
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart, so a restart has nothing
//!   to rehydrate
//! - **Unbounded samples**: every sample is kept

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{
    AlarmStore, HealthStatus, MetricStore, PlantStore, RuleInstanceStore, StorageBackend,
};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alarm, MetricSample, NewAlarm, NewPlant, NewPlantType, Plant, PlantType, RuleInstance,
    Severity,
};

#[derive(Debug, Default)]
struct MemoryState {
    plant_types: HashMap<i64, PlantType>,
    plants: HashMap<i64, Plant>,
    samples: HashMap<i64, Vec<MetricSample>>,
    rule_instances: BTreeMap<i64, RuleInstance>,

    /// Keyed by rule instance id
    alarms: HashMap<i64, Alarm>,

    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,

    /// Number of upcoming alarm writes that fail with `Unavailable`
    failing_alarm_writes: AtomicUsize,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` alarm writes (create or delete) fail
    ///
    /// Simulates a flaky database so the evaluator's retry path can be
    /// exercised without one.
    pub fn fail_next_alarm_writes(&self, count: usize) {
        self.failing_alarm_writes.store(count, Ordering::SeqCst);
    }

    /// Number of alarms currently stored
    pub async fn alarm_count(&self) -> usize {
        self.state.read().await.alarms.len()
    }

    fn take_alarm_write_failure(&self) -> StorageResult<()> {
        let consumed = self
            .failing_alarm_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));

        match consumed {
            Ok(_) => Err(StorageError::Unavailable(
                "injected alarm write failure".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl PlantStore for MemoryBackend {
    async fn get_plant(&self, id: i64) -> StorageResult<Option<Plant>> {
        Ok(self.state.read().await.plants.get(&id).cloned())
    }

    async fn get_plant_type(&self, id: i64) -> StorageResult<Option<PlantType>> {
        Ok(self.state.read().await.plant_types.get(&id).cloned())
    }

    async fn insert_plant_type(&self, plant_type: NewPlantType) -> StorageResult<PlantType> {
        let mut state = self.state.write().await;
        let plant_type = plant_type.with_id(state.next_id());
        state.plant_types.insert(plant_type.id, plant_type.clone());
        Ok(plant_type)
    }

    async fn insert_plant(&self, plant: NewPlant) -> StorageResult<Plant> {
        let mut state = self.state.write().await;
        let plant = plant.with_id(state.next_id());
        state.plants.insert(plant.id, plant.clone());
        Ok(plant)
    }

    async fn delete_plant(&self, id: i64) -> StorageResult<bool> {
        debug!("deleting plant {id} from memory");
        Ok(self.state.write().await.plants.remove(&id).is_some())
    }
}

#[async_trait]
impl MetricStore for MemoryBackend {
    async fn latest_sample(&self, sensor_id: i64) -> StorageResult<Option<MetricSample>> {
        let state = self.state.read().await;

        Ok(state
            .samples
            .get(&sensor_id)
            .and_then(|samples| samples.iter().max_by_key(|s| s.timestamp))
            .cloned())
    }

    async fn insert_sample(&self, sample: MetricSample) -> StorageResult<()> {
        trace!("storing sample of sensor {}", sample.sensor_id);
        self.state
            .write()
            .await
            .samples
            .entry(sample.sensor_id)
            .or_default()
            .push(sample);
        Ok(())
    }
}

#[async_trait]
impl RuleInstanceStore for MemoryBackend {
    async fn list_rule_instances(&self) -> StorageResult<Vec<RuleInstance>> {
        Ok(self.state.read().await.rule_instances.values().cloned().collect())
    }

    async fn list_rule_instances_for_plant(
        &self,
        plant_id: i64,
    ) -> StorageResult<Vec<RuleInstance>> {
        Ok(self
            .state
            .read()
            .await
            .rule_instances
            .values()
            .filter(|instance| instance.target_plant_id == plant_id)
            .cloned()
            .collect())
    }

    async fn get_rule_instance(&self, id: i64) -> StorageResult<Option<RuleInstance>> {
        Ok(self.state.read().await.rule_instances.get(&id).cloned())
    }

    async fn create_rule_instance(
        &self,
        rule_kind: &str,
        target_plant_id: i64,
    ) -> StorageResult<RuleInstance> {
        let mut state = self.state.write().await;
        let instance = RuleInstance {
            id: state.next_id(),
            rule_kind: rule_kind.to_string(),
            target_plant_id,
            raised: false,
        };
        state.rule_instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    async fn delete_rule_instance(&self, id: i64) -> StorageResult<bool> {
        Ok(self.state.write().await.rule_instances.remove(&id).is_some())
    }

    async fn set_raised(&self, id: i64, raised: bool) -> StorageResult<()> {
        if let Some(instance) = self.state.write().await.rule_instances.get_mut(&id) {
            instance.raised = raised;
        }
        Ok(())
    }
}

#[async_trait]
impl AlarmStore for MemoryBackend {
    async fn find_alarm(&self, rule_instance_id: i64) -> StorageResult<Option<Alarm>> {
        Ok(self.state.read().await.alarms.get(&rule_instance_id).cloned())
    }

    async fn create_alarm(&self, alarm: NewAlarm) -> StorageResult<Alarm> {
        self.take_alarm_write_failure()?;

        let mut state = self.state.write().await;
        if let Some(existing) = state.alarms.get(&alarm.rule_instance_id) {
            return Ok(existing.clone());
        }

        let alarm = Alarm {
            id: state.next_id(),
            rule_instance_id: alarm.rule_instance_id,
            severity: alarm.severity,
            message: alarm.message,
            created_at: Utc::now(),
        };
        state.alarms.insert(alarm.rule_instance_id, alarm.clone());
        Ok(alarm)
    }

    async fn delete_alarm(&self, rule_instance_id: i64) -> StorageResult<bool> {
        self.take_alarm_write_failure()?;
        Ok(self.state.write().await.alarms.remove(&rule_instance_id).is_some())
    }

    async fn list_alarms_for_plant(
        &self,
        plant_id: i64,
        severity: Option<Severity>,
    ) -> StorageResult<Vec<Alarm>> {
        let state = self.state.read().await;

        let mut alarms: Vec<Alarm> = state
            .alarms
            .values()
            .filter(|alarm| {
                state
                    .rule_instances
                    .get(&alarm.rule_instance_id)
                    .is_some_and(|instance| instance.target_plant_id == plant_id)
            })
            .filter(|alarm| severity.is_none_or(|s| alarm.severity == s))
            .cloned()
            .collect();
        alarms.sort_by_key(|alarm| (alarm.created_at, alarm.id));

        Ok(alarms)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("plants".to_string(), state.plants.len().to_string()),
                (
                    "rule_instances".to_string(),
                    state.rule_instances.len().to_string(),
                ),
                ("alarms".to_string(), state.alarms.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
