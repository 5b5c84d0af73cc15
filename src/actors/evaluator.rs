//! RuleEvaluator - Polls one rule and keeps its alarm in sync
//!
//! Each rule instance gets its own evaluator task. Ticks of one evaluator run
//! strictly one after another; evaluators never share state besides the
//! store.
//!
//! ## Alarm State Machine
//!
//! ```text
//! NoAlarm --check()==true -->  Active   create alarm
//! Active  --check()==true -->  Active   no-op
//! Active  --check()==false --> NoAlarm  delete alarm (non-sticky rules only)
//! NoAlarm --check()==false --> NoAlarm  no-op
//! ```
//!
//! Sticky (date-based) rules never leave `Active` on their own.
//!
//! ## Termination
//!
//! Before every evaluation the evaluator verifies that its plant still
//! exists. Once it is gone, the alarm and the rule instance are deleted and
//! the task ends. Besides that, only the cancellation token stops it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::rules::Rule;
use crate::storage::{
    AlarmStore, NewAlarm, PlantStore, RuleInstance, RuleInstanceStore, StorageBackend,
    StorageResult,
};

/// What a tick does to the alarm of its rule instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    /// Create the alarm
    Raise,
    /// An alarm exists and stays
    Keep,
    /// Delete the alarm
    Clear,
    /// No alarm, nothing to do
    Idle,
}

/// Decide the alarm transition for one evaluation
pub fn plan_transition(alarm_exists: bool, triggered: bool, sticky: bool) -> AlarmTransition {
    match (alarm_exists, triggered) {
        (false, true) => AlarmTransition::Raise,
        (true, true) => AlarmTransition::Keep,
        (true, false) if sticky => AlarmTransition::Keep,
        (true, false) => AlarmTransition::Clear,
        (false, false) => AlarmTransition::Idle,
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Wait for the next tick
    Continue,
    /// The plant is gone and the rule instance was removed
    Retired,
}

/// Delete the alarm and then the rule instance itself
pub(crate) async fn remove_rule_instance(
    store: &dyn StorageBackend,
    rule_instance_id: i64,
) -> StorageResult<()> {
    store.delete_alarm(rule_instance_id).await?;
    store.delete_rule_instance(rule_instance_id).await?;
    Ok(())
}

pub struct RuleEvaluator {
    instance: RuleInstance,
    rule: Box<dyn Rule>,
    store: Arc<dyn StorageBackend>,
    interval: Duration,
    cancel: CancellationToken,

    /// Last value written to the instance's `raised` flag
    raised: bool,

    /// A sticky rule fired but its alarm could not be written yet
    owed_raise: bool,
}

impl RuleEvaluator {
    pub fn new(
        instance: RuleInstance,
        rule: Box<dyn Rule>,
        store: Arc<dyn StorageBackend>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let raised = instance.raised;
        Self {
            instance,
            rule,
            store,
            interval,
            cancel,
            raised,
            owed_raise: false,
        }
    }

    pub fn rule_instance_id(&self) -> i64 {
        self.instance.id
    }

    /// Run the evaluator's main loop
    ///
    /// The first evaluation happens right away, then once per interval, until
    /// the plant is gone or the token is cancelled.
    #[instrument(
        skip(self),
        fields(rule_instance = self.instance.id, kind = %self.instance.rule_kind)
    )]
    pub async fn run(mut self) {
        debug!("starting rule evaluator (interval {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("evaluator cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    if self.tick(Utc::now()).await == TickOutcome::Retired {
                        break;
                    }
                }
            }
        }

        debug!("rule evaluator stopped");
    }

    /// Evaluate the rule once at `now` and reconcile the alarm
    ///
    /// Store failures are logged and leave the state for the next tick.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let plant_id = self.instance.target_plant_id;

        match self.store.get_plant(plant_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return self.retire().await,
            Err(e) => {
                warn!("could not look up plant {plant_id}, retrying next tick: {e}");
                return TickOutcome::Continue;
            }
        }

        let triggered = match self.rule.check(now).await {
            Ok(triggered) => triggered || self.owed_raise,
            Err(e) => {
                warn!("rule check failed, retrying next tick: {e}");
                return TickOutcome::Continue;
            }
        };

        match self.reconcile(triggered).await {
            Ok(transition) => {
                trace!("triggered={triggered} → {transition:?}");
                self.owed_raise = false;
            }
            Err(e) => {
                // the date cursor already moved on, keep the positive result
                if triggered && self.rule.is_sticky() {
                    self.owed_raise = true;
                }
                warn!("alarm reconciliation failed, retrying next tick: {e}");
            }
        }

        TickOutcome::Continue
    }

    /// Apply the state machine for one evaluation result
    async fn reconcile(&mut self, triggered: bool) -> StorageResult<AlarmTransition> {
        let id = self.instance.id;
        let alarm = self.store.find_alarm(id).await?;
        let transition = plan_transition(alarm.is_some(), triggered, self.rule.is_sticky());

        match transition {
            AlarmTransition::Raise => {
                let alarm = self
                    .store
                    .create_alarm(NewAlarm {
                        rule_instance_id: id,
                        severity: self.rule.severity(),
                        message: self.rule.message().to_string(),
                    })
                    .await?;
                info!("alarm raised ({}): {}", alarm.severity, alarm.message);
                self.sync_raised(true).await?;
            }
            AlarmTransition::Clear => {
                self.store.delete_alarm(id).await?;
                info!("alarm cleared: {}", self.rule.message());
                self.sync_raised(false).await?;
            }
            AlarmTransition::Keep => self.sync_raised(true).await?,
            AlarmTransition::Idle => self.sync_raised(false).await?,
        }

        Ok(transition)
    }

    async fn sync_raised(&mut self, raised: bool) -> StorageResult<()> {
        if self.raised != raised {
            self.store.set_raised(self.instance.id, raised).await?;
            self.raised = raised;
        }
        Ok(())
    }

    async fn retire(&mut self) -> TickOutcome {
        info!(
            "plant {} no longer exists, removing rule instance",
            self.instance.target_plant_id
        );

        match remove_rule_instance(self.store.as_ref(), self.instance.id).await {
            Ok(()) => TickOutcome::Retired,
            Err(e) => {
                warn!("could not remove rule instance, retrying next tick: {e}");
                TickOutcome::Continue
            }
        }
    }
}
