//! Background tasks evaluating rules
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  AlertingEngine  │  register_plant / bootstrap
//!                 └────────┬─────────┘
//!                          │ ensure_running(id)
//!                 ┌────────▼─────────┐
//!                 │   TaskRegistry   │  id → JoinHandle, root CancellationToken
//!                 └────────┬─────────┘
//!                          │ spawns (at most one per id)
//!          ┌───────────────┼───────────────┐
//!  ┌───────▼───────┐ ┌─────▼─────────┐ ┌───▼───────────┐
//!  │ RuleEvaluator │ │ RuleEvaluator │ │ RuleEvaluator │  one tokio task each
//!  └───────┬───────┘ └─────┬─────────┘ └───┬───────────┘
//!          └───────────────┼───────────────┘
//!                 ┌────────▼─────────┐
//!                 │  StorageBackend  │  samples, rule instances, alarms
//!                 └──────────────────┘
//! ```
//!
//! Evaluators don't talk to each other. Each one reads its plant's samples
//! and writes only its own rule instance and alarm.
//!
//! ## Lifecycle
//!
//! - Started by [`registry::TaskRegistry::ensure_running`], deduplicated by id
//! - Stopped when the target plant disappears (the evaluator deletes its rule
//!   instance and alarm first) or when the registry shuts down

pub mod evaluator;
pub mod registry;
