//! Helper functions for integration tests

use chrono::Utc;
use plant_monitoring::actors::registry::TaskRegistry;
use plant_monitoring::engine::AlertingEngine;
use plant_monitoring::rules::factory::RuleFactory;
use plant_monitoring::storage::{
    MetricSample, NewPlant, NewPlantType, Plant, PlantStore, StorageBackend,
};
use std::sync::Arc;
use std::time::Duration;

/// Evaluation interval used by all integration tests
pub const TICK: Duration = Duration::from_millis(20);

pub fn cactus_type() -> NewPlantType {
    NewPlantType {
        name: "Echinopsis".to_string(),
        temperature_max: 35.0,
        temperature_min: 5.0,
        light_max: 50_000.0,
        light_min: 2_000.0,
        soil_moisture_max: 30.0,
        soil_moisture_min: 5.0,
        transplantation_month: 4,
        transplantation_interval: 3,
    }
}

/// Insert a cactus on `sensor_id`, transplanted in `last_transplantation_year`
pub async fn create_test_plant(
    store: &dyn StorageBackend,
    sensor_id: Option<i64>,
    last_transplantation_year: i32,
) -> Plant {
    let plant_type = store.insert_plant_type(cactus_type()).await.unwrap();
    store
        .insert_plant(NewPlant {
            name: "window cactus".to_string(),
            plant_type_id: plant_type.id,
            sensor_id,
            last_transplantation_year,
        })
        .await
        .unwrap()
}

/// A plant whose transplantation is not due for a long time
pub async fn create_fresh_plant(store: &dyn StorageBackend, sensor_id: Option<i64>) -> Plant {
    create_test_plant(store, sensor_id, 2999).await
}

pub fn create_sample(
    sensor_id: i64,
    temperature: f64,
    light: f64,
    soil_moisture: f64,
) -> MetricSample {
    MetricSample {
        timestamp: Utc::now(),
        sensor_id,
        temperature: Some(temperature),
        light: Some(light),
        soil_moisture: Some(soil_moisture),
    }
}

/// Sample inside every cactus limit
pub fn healthy_sample(sensor_id: i64) -> MetricSample {
    create_sample(sensor_id, 22.0, 10_000.0, 15.0)
}

pub fn create_test_engine(store: Arc<dyn StorageBackend>) -> AlertingEngine {
    AlertingEngine::new(TaskRegistry::new(
        store,
        RuleFactory::with_builtin_rules(),
        TICK,
    ))
}

/// Wait until the plant has exactly `count` alarms, panicking after two
/// seconds
pub async fn wait_for_alarms(engine: &AlertingEngine, plant_id: i64, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while alarm_count(engine, plant_id).await != count {
            tokio::time::sleep(TICK / 2).await;
        }
    })
    .await;

    assert!(waited.is_ok(), "plant {plant_id} never reached {count} alarm(s)");
}

pub async fn wait_for_running(engine: &AlertingEngine, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while engine.registry().running_count().await != count {
            tokio::time::sleep(TICK / 2).await;
        }
    })
    .await;

    assert!(waited.is_ok(), "never reached {count} running evaluator(s)");
}

/// Number of alarms of the plant, all severities
pub async fn alarm_count(engine: &AlertingEngine, plant_id: i64) -> usize {
    engine.list_alarms(plant_id, None).await.unwrap().len()
}
