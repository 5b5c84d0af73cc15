//! Tag → constructor registry used to rehydrate rules
//!
//! The factory is built once by the composition root and shared by the task
//! registry. Unknown tags are rejected with [`RuleError::UnknownRuleKind`].

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::date_based::{DateBasedRule, TRANSPLANTATION};
use super::threshold::{ThresholdKind, ThresholdRule};
use super::{Rule, RuleContext, RuleError};

/// Async constructor producing a rule from its context
pub type RuleConstructor =
    Arc<dyn Fn(RuleContext) -> BoxFuture<'static, Result<Box<dyn Rule>, RuleError>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RuleFactory {
    constructors: BTreeMap<String, RuleConstructor>,
}

impl RuleFactory {
    /// A factory without any rule kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory knowing the six threshold kinds and transplantation
    pub fn with_builtin_rules() -> Self {
        let mut factory = Self::new();

        for kind in ThresholdKind::ALL {
            factory.register(kind.tag(), move |ctx| {
                async move {
                    let rule = ThresholdRule::create_from_db(kind, ctx).await?;
                    Ok::<_, RuleError>(Box::new(rule) as Box<dyn Rule>)
                }
                .boxed()
            });
        }

        factory.register(TRANSPLANTATION, |ctx| {
            async move {
                let rule = DateBasedRule::transplantation(ctx).await?;
                Ok::<_, RuleError>(Box::new(rule) as Box<dyn Rule>)
            }
            .boxed()
        });

        factory
    }

    /// Add a rule kind, replacing any constructor registered for the tag
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(RuleContext) -> BoxFuture<'static, Result<Box<dyn Rule>, RuleError>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(tag.into(), Arc::new(constructor));
    }

    /// Registered tags, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Rehydrate the rule of kind `tag`
    pub async fn create(&self, tag: &str, ctx: RuleContext) -> Result<Box<dyn Rule>, RuleError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| RuleError::UnknownRuleKind(tag.to_string()))?;

        debug!(
            "constructing {tag} rule for rule instance {} (plant {})",
            ctx.rule_instance_id, ctx.plant.id
        );
        constructor(ctx).await
    }
}

impl std::fmt::Debug for RuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFactory")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
