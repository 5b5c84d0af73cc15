//! TaskRegistry - At most one running evaluator per rule instance
//!
//! The registry owns the join handles of all evaluator tasks, keyed by rule
//! instance id. Starting an evaluator is an insert-if-absent under one lock,
//! so concurrent callers can never start the same instance twice.
//!
//! Evaluators remove their own entry when they stop (plant deleted or
//! shutdown). All of them derive their cancellation token from the
//! registry's root token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::evaluator::{RuleEvaluator, remove_rule_instance};
use crate::rules::factory::RuleFactory;
use crate::rules::{RuleContext, RuleError};
use crate::storage::{PlantStore, RuleInstanceStore, StorageBackend, StorageResult};

/// Outcome of [`TaskRegistry::bootstrap`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Evaluators started
    pub started: usize,

    /// Instances whose evaluator was already running
    pub already_running: usize,

    /// Instances deleted because their plant is gone
    pub removed: usize,

    /// Instances that could not be started, see the log
    pub failed: usize,
}

/// Shortest evaluation interval; a zero period would panic the tick timer
const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct RegistryInner {
    store: Arc<dyn StorageBackend>,
    factory: RuleFactory,
    interval: Duration,
    shutdown: CancellationToken,
    workers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

/// Cheaply cloneable handle to the set of running evaluators
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn StorageBackend>, factory: RuleFactory, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!("evaluation interval {interval:?} is too short, using {MIN_INTERVAL:?}");
        }
        let interval = interval.max(MIN_INTERVAL);

        Self {
            inner: Arc::new(RegistryInner {
                store,
                factory,
                interval,
                shutdown: CancellationToken::new(),
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.inner.store
    }

    pub fn factory(&self) -> &RuleFactory {
        &self.inner.factory
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Start the evaluator of a rule instance unless it is already running
    ///
    /// Returns `Ok(true)` if an evaluator was started, `Ok(false)` if one was
    /// already running (or the registry is shut down).
    #[instrument(skip(self))]
    pub async fn ensure_running(&self, rule_instance_id: i64) -> Result<bool, RuleError> {
        let mut workers = self.inner.workers.lock().await;

        if let Some(handle) = workers.get(&rule_instance_id) {
            if !handle.is_finished() {
                trace!("evaluator already running");
                return Ok(false);
            }
            // finished without deregistering, i.e. it panicked
            warn!("replacing dead evaluator");
            workers.remove(&rule_instance_id);
        }

        if self.inner.shutdown.is_cancelled() {
            debug!("registry is shut down, not starting evaluator");
            return Ok(false);
        }

        let store = &self.inner.store;
        let instance = store
            .get_rule_instance(rule_instance_id)
            .await?
            .ok_or(RuleError::InstanceNotFound(rule_instance_id))?;

        let plant = store
            .get_plant(instance.target_plant_id)
            .await?
            .ok_or_else(|| {
                RuleError::MissingDependency(format!(
                    "plant {} of rule instance {rule_instance_id} does not exist",
                    instance.target_plant_id
                ))
            })?;

        let ctx = RuleContext {
            rule_instance_id,
            plant,
            store: store.clone(),
        };
        let rule = self.inner.factory.create(&instance.rule_kind, ctx).await?;

        let kind = instance.rule_kind.clone();
        let evaluator = RuleEvaluator::new(
            instance,
            rule,
            store.clone(),
            self.inner.interval,
            self.inner.shutdown.child_token(),
        );

        let registry = self.clone();
        let handle = tokio::spawn(async move {
            evaluator.run().await;
            registry.forget(rule_instance_id).await;
        });
        workers.insert(rule_instance_id, handle);

        info!("started {kind} evaluator");
        Ok(true)
    }

    async fn forget(&self, rule_instance_id: i64) {
        self.inner.workers.lock().await.remove(&rule_instance_id);
        trace!("evaluator {rule_instance_id} deregistered");
    }

    pub async fn is_running(&self, rule_instance_id: i64) -> bool {
        self.inner
            .workers
            .lock()
            .await
            .get(&rule_instance_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Ids of all running evaluators, sorted
    pub async fn running_ids(&self) -> Vec<i64> {
        let workers = self.inner.workers.lock().await;
        let mut ids: Vec<i64> = workers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn running_count(&self) -> usize {
        self.running_ids().await.len()
    }

    /// Restart the evaluators of all persisted rule instances
    ///
    /// Instances whose plant no longer exists are deleted together with their
    /// alarm. A failure to start one instance is logged and does not stop
    /// the others; only failing to list the instances is an error.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> StorageResult<BootstrapReport> {
        let instances = self.inner.store.list_rule_instances().await?;
        let mut report = BootstrapReport::default();

        info!("bootstrapping {} rule instance(s)", instances.len());

        for instance in instances {
            let id = instance.id;

            match self.inner.store.get_plant(instance.target_plant_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    match remove_rule_instance(self.inner.store.as_ref(), id).await {
                        Ok(()) => {
                            info!(
                                "removed rule instance {id}, plant {} is gone",
                                instance.target_plant_id
                            );
                            report.removed += 1;
                        }
                        Err(e) => {
                            error!("could not remove orphaned rule instance {id}: {e}");
                            report.failed += 1;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    error!("could not look up plant of rule instance {id}: {e}");
                    report.failed += 1;
                    continue;
                }
            }

            match self.ensure_running(id).await {
                Ok(true) => report.started += 1,
                Ok(false) => report.already_running += 1,
                Err(e) => {
                    error!("could not start rule instance {id} ({}): {e}", instance.rule_kind);
                    report.failed += 1;
                }
            }
        }

        info!(
            "bootstrap done: {} started, {} already running, {} removed, {} failed",
            report.started, report.already_running, report.removed, report.failed
        );
        Ok(report)
    }

    /// Cancel every evaluator and wait for them to stop
    ///
    /// No evaluator can be started afterwards.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let workers: Vec<_> = self.inner.workers.lock().await.drain().collect();
        debug!("waiting for {} evaluator(s) to stop", workers.len());

        for (id, handle) in workers {
            if let Err(e) = handle.await {
                error!("evaluator {id} did not stop cleanly: {e}");
            }
        }
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("factory", &self.inner.factory)
            .field("interval", &self.inner.interval)
            .finish_non_exhaustive()
    }
}
