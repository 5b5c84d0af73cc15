//! Restart behaviour: persisted rule instances are picked up again

use crate::helpers::*;
use plant_monitoring::actors::registry::BootstrapReport;
use plant_monitoring::storage::{
    AlarmStore, MemoryBackend, MetricStore, NewAlarm, PlantStore, RuleInstanceStore, Severity,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_bootstrap_after_restart() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, Some(8)).await;
    store.insert_sample(create_sample(8, 45.0, 10_000.0, 15.0)).await.unwrap();

    let first = create_test_engine(store.clone());
    let instances = first.register_plant(plant.id).await.unwrap();
    wait_for_alarms(&first, plant.id, 1).await;
    first.shutdown().await;
    assert_eq!(first.registry().running_count().await, 0);

    let second = create_test_engine(store.clone());
    let report = second.bootstrap().await.unwrap();
    assert_eq!(
        report,
        BootstrapReport {
            started: 7,
            ..Default::default()
        }
    );

    let mut expected: Vec<i64> = instances.iter().map(|i| i.id).collect();
    expected.sort_unstable();
    assert_eq!(second.registry().running_ids().await, expected);

    tokio::time::sleep(TICK * 5).await;
    assert_eq!(alarm_count(&second, plant.id).await, 1);
    assert_eq!(store.list_rule_instances().await.unwrap().len(), 7);

    second.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_twice_starts_nothing_new() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, None).await;
    for kind in ["temperature_min", "transplantation"] {
        store.create_rule_instance(kind, plant.id).await.unwrap();
    }

    let engine = create_test_engine(store.clone());
    assert_eq!(engine.bootstrap().await.unwrap().started, 2);

    let again = engine.bootstrap().await.unwrap();
    assert_eq!(again.started, 0);
    assert_eq!(again.already_running, 2);
    assert_eq!(engine.registry().running_count().await, 2);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_removes_instances_of_deleted_plants() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_test_plant(&*store, None, 2001).await;

    let first = create_test_engine(store.clone());
    first.register_plant(plant.id).await.unwrap();
    wait_for_alarms(&first, plant.id, 1).await;
    first.shutdown().await;

    store.delete_plant(plant.id).await.unwrap();

    let second = create_test_engine(store.clone());
    let report = second.bootstrap().await.unwrap();

    assert_eq!(report.removed, 7);
    assert_eq!(report.started, 0);
    assert!(store.list_rule_instances().await.unwrap().is_empty());
    assert_eq!(store.alarm_count().await, 0);
}

#[tokio::test]
async fn test_stale_alarm_cleared_after_restart() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, Some(4)).await;
    store.insert_sample(create_sample(4, 1.0, 10_000.0, 15.0)).await.unwrap();

    let first = create_test_engine(store.clone());
    first.register_plant(plant.id).await.unwrap();
    wait_for_alarms(&first, plant.id, 1).await;
    first.shutdown().await;

    // the plant warmed up while nothing was running
    store.insert_sample(healthy_sample(4)).await.unwrap();

    let second = create_test_engine(store.clone());
    second.bootstrap().await.unwrap();
    wait_for_alarms(&second, plant.id, 0).await;

    second.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_after_registration_starts_nothing() {
    let store = Arc::new(MemoryBackend::new());
    let plant = create_fresh_plant(&*store, None).await;

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();

    let report = engine.bootstrap().await.unwrap();
    assert_eq!(
        report,
        BootstrapReport {
            already_running: 7,
            ..Default::default()
        }
    );
    assert_eq!(engine.registry().running_count().await, 7);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_starts_live_and_removes_orphaned_instances() {
    let store = Arc::new(MemoryBackend::new());
    let live = create_fresh_plant(&*store, Some(5)).await;
    let doomed = create_fresh_plant(&*store, Some(6)).await;

    let temperature = store.create_rule_instance("temperature_max", live.id).await.unwrap();
    let light = store.create_rule_instance("light_min", live.id).await.unwrap();
    let orphan = store.create_rule_instance("temperature_max", doomed.id).await.unwrap();
    store
        .create_alarm(NewAlarm {
            rule_instance_id: orphan.id,
            severity: Severity::Problem,
            message: "too hot".to_string(),
        })
        .await
        .unwrap();

    store.delete_plant(doomed.id).await.unwrap();

    let engine = create_test_engine(store.clone());
    let report = engine.bootstrap().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(report.started, 2);
    assert_eq!(report.failed, 0);

    assert!(store.find_alarm(orphan.id).await.unwrap().is_none());
    assert!(store.get_rule_instance(orphan.id).await.unwrap().is_none());

    let mut expected = vec![temperature.id, light.id];
    expected.sort_unstable();
    assert_eq!(engine.registry().running_ids().await, expected);

    engine.shutdown().await;
}
