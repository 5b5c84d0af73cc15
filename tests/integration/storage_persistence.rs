//! Integration tests for the SQLite backend across restarts
//!
//! These tests verify that:
//! - Rule instances and alarms survive closing the database
//! - Bootstrap on a reopened database neither duplicates alarms nor tasks

use crate::helpers::*;
use plant_monitoring::storage::sqlite::SqliteBackend;
use plant_monitoring::storage::{
    AlarmStore, MetricStore, RuleInstanceStore, Severity, StorageBackend,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_rule_instances_survive_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("plants.db");

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let plant = create_fresh_plant(&*store, Some(21)).await;
    store
        .insert_sample(create_sample(21, 40.0, 10_000.0, 15.0))
        .await
        .unwrap();

    let engine = create_test_engine(store.clone());
    let instances = engine.register_plant(plant.id).await.unwrap();
    wait_for_alarms(&engine, plant.id, 1).await;
    engine.shutdown().await;
    store.close().await.unwrap();

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let persisted = store.list_rule_instances().await.unwrap();
    assert_eq!(persisted.len(), 7);

    let hot = persisted
        .iter()
        .find(|i| i.rule_kind == "temperature_max")
        .unwrap();
    assert!(hot.raised);
    assert!(instances.iter().any(|i| i.id == hot.id));

    let engine = create_test_engine(store.clone());
    assert_eq!(engine.bootstrap().await.unwrap().started, 7);

    tokio::time::sleep(TICK * 5).await;
    let alarms = store.list_alarms_for_plant(plant.id, None).await.unwrap();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].rule_instance_id, hot.id);
    assert_eq!(alarms[0].severity, Severity::Problem);

    engine.shutdown().await;
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_sticky_alarm_persists() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("plants.db");

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let plant = create_test_plant(&*store, None, 2001).await;

    let engine = create_test_engine(store.clone());
    engine.register_plant(plant.id).await.unwrap();
    wait_for_alarms(&engine, plant.id, 1).await;
    engine.shutdown().await;
    store.close().await.unwrap();

    let store: Arc<dyn StorageBackend> = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let engine = create_test_engine(store.clone());
    engine.bootstrap().await.unwrap();
    tokio::time::sleep(TICK * 5).await;

    let recommendations = engine
        .list_alarms(plant.id, Some(Severity::Recommendation))
        .await
        .unwrap();
    assert_eq!(recommendations.len(), 1);

    engine.shutdown().await;
    store.close().await.unwrap();
}
