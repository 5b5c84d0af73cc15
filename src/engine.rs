//! Entry points used by the hub and by embedding applications

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::actors::registry::{BootstrapReport, TaskRegistry};
use crate::config::EngineConfig;
use crate::rules::RuleError;
use crate::rules::factory::RuleFactory;
use crate::storage::{
    AlarmStore, PlantStore, RuleInstance, RuleInstanceStore, Severity, StorageBackend,
    StorageResult,
};

/// The alerting engine: a store, a rule factory and the running evaluators
#[derive(Debug, Clone)]
pub struct AlertingEngine {
    registry: TaskRegistry,
}

impl AlertingEngine {
    pub fn new(registry: TaskRegistry) -> Self {
        Self { registry }
    }

    /// Engine with the built-in rule kinds
    pub fn from_config(store: Arc<dyn StorageBackend>, config: &EngineConfig) -> Self {
        Self::new(TaskRegistry::new(
            store,
            RuleFactory::with_builtin_rules(),
            config.interval(),
        ))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        self.registry.store()
    }

    /// Put a plant under monitoring
    ///
    /// Creates a rule instance for every registered kind the plant does not
    /// have yet and makes sure all of the plant's instances are running.
    /// Registering the same plant twice is harmless. If some instance cannot
    /// be started, the others are still started and the first error is
    /// returned.
    #[instrument(skip(self))]
    pub async fn register_plant(&self, plant_id: i64) -> Result<Vec<RuleInstance>, RuleError> {
        let store = self.store();

        if store.get_plant(plant_id).await?.is_none() {
            return Err(RuleError::MissingDependency(format!(
                "plant {plant_id} does not exist"
            )));
        }

        let mut instances = store.list_rule_instances_for_plant(plant_id).await?;
        for kind in self.registry.factory().kinds() {
            if !instances.iter().any(|instance| instance.rule_kind == kind) {
                instances.push(store.create_rule_instance(kind, plant_id).await?);
            }
        }

        let mut first_error = None;
        for instance in &instances {
            if let Err(e) = self.registry.ensure_running(instance.id).await {
                error!(
                    "could not start rule instance {} ({}): {e}",
                    instance.id, instance.rule_kind
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("plant {plant_id} monitored by {} rule(s)", instances.len());
                Ok(instances)
            }
        }
    }

    /// Restart the evaluators of all persisted rule instances
    pub async fn bootstrap(&self) -> StorageResult<BootstrapReport> {
        self.registry.bootstrap().await
    }

    /// Messages of the plant's active alarms, oldest first
    pub async fn list_alarms(
        &self,
        plant_id: i64,
        severity: Option<Severity>,
    ) -> StorageResult<Vec<String>> {
        let alarms = self.store().list_alarms_for_plant(plant_id, severity).await?;
        Ok(alarms.into_iter().map(|alarm| alarm.message).collect())
    }

    /// Stop all evaluators
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
