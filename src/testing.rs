//! Fixtures shared by the unit tests

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use crate::rules::RuleContext;
use crate::storage::{MemoryBackend, MetricSample, NewPlant, NewPlantType, Plant, PlantStore};

/// Ficus profile: 15-30°C, 800-20000 lux, 20-60% soil moisture, transplanted
/// every two years in March
pub fn ficus_type() -> NewPlantType {
    NewPlantType {
        name: "Ficus benjamina".to_string(),
        temperature_max: 30.0,
        temperature_min: 15.0,
        light_max: 20_000.0,
        light_min: 800.0,
        soil_moisture_max: 60.0,
        soil_moisture_min: 20.0,
        transplantation_month: 3,
        transplantation_interval: 2,
    }
}

/// Insert a ficus (and its type) last transplanted in 2020
pub async fn insert_ficus(store: &Arc<MemoryBackend>, sensor_id: Option<i64>) -> Plant {
    let plant_type = store.insert_plant_type(ficus_type()).await.unwrap();
    store
        .insert_plant(NewPlant {
            name: "office ficus".to_string(),
            plant_type_id: plant_type.id,
            sensor_id,
            last_transplantation_year: 2020,
        })
        .await
        .unwrap()
}

pub fn context_for(
    store: &Arc<MemoryBackend>,
    rule_instance_id: i64,
    plant: &Plant,
) -> RuleContext {
    RuleContext {
        rule_instance_id,
        plant: plant.clone(),
        store: store.clone(),
    }
}

/// Sample taken `minute` minutes after a fixed base instant
pub fn sample_at(
    sensor_id: i64,
    minute: i64,
    temperature: Option<f64>,
    light: Option<f64>,
    soil_moisture: Option<f64>,
) -> MetricSample {
    MetricSample {
        timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap() + Duration::minutes(minute),
        sensor_id,
        temperature,
        light,
        soil_moisture,
    }
}

pub fn temperature_sample(sensor_id: i64, minute: i64, temperature: f64) -> MetricSample {
    sample_at(sensor_id, minute, Some(temperature), None, None)
}
