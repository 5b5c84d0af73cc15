//! Storage backends for plants, samples, rule instances and alarms
//!
//! ## Design
//!
//! - **Trait-based**: the engine only sees `Arc<dyn StorageBackend>`
//! - **Async**: All operations are async for compatibility with Tokio tasks
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing
//!
//! ## Usage
//!
//! ```no_run
//! use plant_monitoring::{config::StorageConfig, storage::open_backend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = open_backend(&StorageConfig::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{AlarmStore, MetricStore, PlantStore, RuleInstanceStore, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{
    Alarm, MetricSample, NewAlarm, NewPlant, NewPlantType, Plant, PlantType, RuleInstance,
    Severity,
};

use crate::config::StorageConfig;

/// Open the backend selected by the configuration
pub async fn open_backend(config: &StorageConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            tracing::warn!("using in-memory storage, rule instances will not survive a restart");
            Ok(Arc::new(MemoryBackend::new()))
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteBackend::new(path).await?)),

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite storage requested but the `storage-sqlite` feature is disabled".to_string(),
        )),
    }
}
