//! End-to-end tests of registered plants with live evaluators
//!
//! These tests verify that:
//! - Threshold alarms follow the latest readings
//! - Repeated positive checks never duplicate an alarm
//! - Transplantation alarms stay once raised
//! - Deleting a plant stops its evaluators and removes their state

use crate::helpers::*;
use plant_monitoring::storage::{
    AlarmStore, MemoryBackend, MetricStore, PlantStore, RuleInstanceStore, Severity,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_threshold_alarm_follows_readings() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, Some(10)).await;
    store.insert_sample(healthy_sample(10)).await.unwrap();

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();
    assert_eq!(engine.registry().running_count().await, 7);

    tokio::time::sleep(TICK * 5).await;
    assert_eq!(alarm_count(&engine, plant.id).await, 0);

    store.insert_sample(create_sample(10, 41.0, 10_000.0, 15.0)).await.unwrap();
    wait_for_alarms(&engine, plant.id, 1).await;

    let problems = engine.list_alarms(plant.id, Some(Severity::Problem)).await.unwrap();
    assert_eq!(
        problems,
        vec!["window cactus: temperature is above the safe maximum of 35".to_string()]
    );

    store.insert_sample(healthy_sample(10)).await.unwrap();
    wait_for_alarms(&engine, plant.id, 0).await;

    engine.shutdown().await;
}

#[tokio::test]
async fn test_repeated_positive_checks_keep_one_alarm() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, Some(3)).await;
    // too dark and too wet at the same time
    store.insert_sample(create_sample(3, 20.0, 100.0, 80.0)).await.unwrap();

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();

    wait_for_alarms(&engine, plant.id, 2).await;
    let first = store.list_alarms_for_plant(plant.id, None).await.unwrap();

    tokio::time::sleep(TICK * 10).await;
    let later = store.list_alarms_for_plant(plant.id, None).await.unwrap();

    assert_eq!(first, later);
    assert_eq!(store.alarm_count().await, 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_transplantation_alarm_is_sticky() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_test_plant(&*store, None, 2001).await;

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();

    wait_for_alarms(&engine, plant.id, 1).await;

    let recommendations = engine
        .list_alarms(plant.id, Some(Severity::Recommendation))
        .await
        .unwrap();
    assert_eq!(
        recommendations,
        vec!["window cactus: time to transplant into a bigger pot".to_string()]
    );

    // the schedule catches up one interval per tick, the alarm never flaps
    for _ in 0..10 {
        tokio::time::sleep(TICK).await;
        assert_eq!(alarm_count(&engine, plant.id).await, 1);
    }

    engine.shutdown().await;
}

#[tokio::test]
async fn test_deleting_plant_stops_evaluators() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_test_plant(&*store, Some(5), 2001).await;
    store.insert_sample(create_sample(5, 50.0, 10_000.0, 15.0)).await.unwrap();

    let engine = create_test_engine(store.clone());
    let instances = engine.register_plant(plant.id).await.unwrap();

    wait_for_alarms(&engine, plant.id, 2).await;

    store.delete_plant(plant.id).await.unwrap();
    wait_for_running(&engine, 0).await;

    for instance in instances {
        assert!(store.get_rule_instance(instance.id).await.unwrap().is_none());
        assert!(store.find_alarm(instance.id).await.unwrap().is_none());
    }
    assert_eq!(store.alarm_count().await, 0);
}

#[tokio::test]
async fn test_plants_are_evaluated_independently() {
    let store = Arc::new(MemoryBackend::new());
    let hot = create_fresh_plant(&*store, Some(1)).await;
    let fine = create_fresh_plant(&*store, Some(2)).await;
    store.insert_sample(create_sample(1, 40.0, 10_000.0, 15.0)).await.unwrap();
    store.insert_sample(healthy_sample(2)).await.unwrap();

    let engine = create_test_engine(store.clone());
    let (a, b) = tokio::join!(engine.register_plant(hot.id), engine.register_plant(fine.id));
    a.unwrap();
    b.unwrap();
    assert_eq!(engine.registry().running_count().await, 14);

    wait_for_alarms(&engine, hot.id, 1).await;
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(alarm_count(&engine, fine.id).await, 0);

    engine.shutdown().await;
}
