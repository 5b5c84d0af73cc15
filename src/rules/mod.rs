//! Rules evaluated by the background evaluators
//!
//! A rule is the runtime counterpart of a persisted [`RuleInstance`]: it is
//! rebuilt from store state by the [`factory::RuleFactory`] and then polled
//! with [`Rule::check`] by exactly one evaluator.
//!
//! ## Built-in kinds
//!
//! | tag                 | rule                               | severity       |
//! |---------------------|------------------------------------|----------------|
//! | `temperature_max`   | [`threshold::ThresholdRule`]       | problem        |
//! | `temperature_min`   | [`threshold::ThresholdRule`]       | problem        |
//! | `light_max`         | [`threshold::ThresholdRule`]       | problem        |
//! | `light_min`         | [`threshold::ThresholdRule`]       | problem        |
//! | `soil_moisture_max` | [`threshold::ThresholdRule`]       | problem        |
//! | `soil_moisture_min` | [`threshold::ThresholdRule`]       | problem        |
//! | `transplantation`   | [`date_based::DateBasedRule`]      | recommendation |
//!
//! Rules snapshot the plant and plant type at construction. Editing a plant
//! type does not affect rules that are already running.
//!
//! [`RuleInstance`]: crate::storage::RuleInstance

pub mod date_based;
pub mod factory;
pub mod threshold;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::storage::{
    Plant, PlantStore, PlantType, Severity, StorageBackend, StorageError, StorageResult,
};

/// A single logical check bound to one plant
#[async_trait]
pub trait Rule: Send + Sync {
    /// Tag of the rule kind, as persisted in the rule instance
    fn kind(&self) -> &str;

    /// Severity of the alarm raised by this rule
    fn severity(&self) -> Severity;

    /// Message of the alarm raised by this rule
    fn message(&self) -> &str;

    /// Sticky rules keep their alarm once raised; it is never cleared by a
    /// later negative check.
    fn is_sticky(&self) -> bool {
        false
    }

    /// Whether the condition currently holds
    ///
    /// `now` is the evaluation instant. Only store reads can fail; missing
    /// data is reported as `Ok(false)`.
    async fn check(&mut self, now: DateTime<Utc>) -> StorageResult<bool>;
}

impl fmt::Debug for dyn Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("kind", &self.kind()).finish_non_exhaustive()
    }
}

/// Everything a rule constructor may draw from
#[derive(Clone)]
pub struct RuleContext {
    pub rule_instance_id: i64,

    /// Snapshot of the target plant
    pub plant: Plant,

    pub store: Arc<dyn StorageBackend>,
}

impl RuleContext {
    /// Resolve the plant's type profile
    pub async fn plant_type(&self) -> Result<PlantType, RuleError> {
        self.store
            .get_plant_type(self.plant.plant_type_id)
            .await?
            .ok_or_else(|| {
                RuleError::MissingDependency(format!(
                    "plant type {} of plant {} does not exist",
                    self.plant.plant_type_id, self.plant.id
                ))
            })
    }
}

/// Errors raised while rehydrating a rule
#[derive(Debug)]
pub enum RuleError {
    /// A referenced plant or plant type row is absent
    MissingDependency(String),

    /// No constructor is registered for the tag
    UnknownRuleKind(String),

    /// The plant type carries a schedule that cannot be evaluated
    InvalidSchedule(String),

    /// The rule instance does not exist (anymore)
    InstanceNotFound(i64),

    /// Store access failed
    Storage(StorageError),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::MissingDependency(msg) => write!(f, "missing dependency: {msg}"),
            RuleError::UnknownRuleKind(kind) => write!(f, "unknown rule kind: {kind}"),
            RuleError::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            RuleError::InstanceNotFound(id) => write!(f, "rule instance {id} not found"),
            RuleError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuleError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for RuleError {
    fn from(err: StorageError) -> Self {
        RuleError::Storage(err)
    }
}
