//! Failure scenario tests
//!
//! These tests verify graceful handling of:
//! - Alarm writes failing for a while
//! - Rule instances of unknown kinds
//! - Plants whose type profile is missing

use crate::helpers::*;
use assert_matches::assert_matches;
use plant_monitoring::rules::RuleError;
use plant_monitoring::storage::{
    MemoryBackend, MetricStore, NewPlant, PlantStore, RuleInstanceStore,
};
use std::sync::Arc;

#[tokio::test]
async fn test_alarm_written_once_store_recovers() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, Some(6)).await;
    store.insert_sample(create_sample(6, 20.0, 10_000.0, 2.0)).await.unwrap();
    store.fail_next_alarm_writes(3);

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();

    wait_for_alarms(&engine, plant.id, 1).await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_unknown_kind_does_not_block_bootstrap() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, None).await;
    store.create_rule_instance("humidity_max", plant.id).await.unwrap();
    store.create_rule_instance("light_max", plant.id).await.unwrap();

    let engine = create_test_engine(store.clone());
    let report = engine.bootstrap().await.unwrap();

    assert_eq!(report.started, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(engine.registry().running_count().await, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_register_plant_without_type() {
    let store = Arc::new(MemoryBackend::new());
    let plant = store
        .insert_plant(NewPlant {
            name: "mystery plant".to_string(),
            plant_type_id: 77,
            sensor_id: Some(1),
            last_transplantation_year: 2020,
        })
        .await
        .unwrap();

    let engine = create_test_engine(store.clone());
    let result = engine.register_plant(plant.id).await;

    assert_matches!(result, Err(RuleError::MissingDependency(_)));
    assert_eq!(engine.registry().running_count().await, 0);
}

#[tokio::test]
async fn test_register_missing_plant() {
    let store = Arc::new(MemoryBackend::new());
    let engine = create_test_engine(store.clone());

    assert_matches!(
        engine.register_plant(12).await,
        Err(RuleError::MissingDependency(_))
    );
    assert!(store.list_rule_instances().await.unwrap().is_empty());
}
