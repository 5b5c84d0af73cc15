//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Evaluators keep reading while alarms are written
//! - **Connection pooling**: Shared by every evaluator task
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{
    AlarmStore, HealthStatus, MetricStore, PlantStore, RuleInstanceStore, StorageBackend,
};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alarm, MetricSample, NewAlarm, NewPlant, NewPlantType, Plant, PlantType, RuleInstance,
    Severity,
};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for concurrent readers (WAL mode, etc.)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use plant_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./plants.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::Decode(format!("timestamp out of range: {millis}")))
    }

    fn column_u32(row: &SqliteRow, column: &str) -> StorageResult<u32> {
        let value: i64 = row.try_get(column)?;
        u32::try_from(value)
            .map_err(|_| StorageError::Decode(format!("{column} out of range: {value}")))
    }

    fn plant_type_from_row(row: &SqliteRow) -> StorageResult<PlantType> {
        Ok(PlantType {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            temperature_max: row.try_get("temperature_max")?,
            temperature_min: row.try_get("temperature_min")?,
            light_max: row.try_get("light_max")?,
            light_min: row.try_get("light_min")?,
            soil_moisture_max: row.try_get("soil_moisture_max")?,
            soil_moisture_min: row.try_get("soil_moisture_min")?,
            transplantation_month: Self::column_u32(row, "transplantation_month")?,
            transplantation_interval: Self::column_u32(row, "transplantation_interval")?,
        })
    }

    fn plant_from_row(row: &SqliteRow) -> StorageResult<Plant> {
        Ok(Plant {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            plant_type_id: row.try_get("plant_type_id")?,
            sensor_id: row.try_get("sensor_id")?,
            last_transplantation_year: row.try_get("last_transplantation_year")?,
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<MetricSample> {
        Ok(MetricSample {
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            sensor_id: row.try_get("sensor_id")?,
            temperature: row.try_get("temperature")?,
            light: row.try_get("light")?,
            soil_moisture: row.try_get("soil_moisture")?,
        })
    }

    fn rule_instance_from_row(row: &SqliteRow) -> StorageResult<RuleInstance> {
        Ok(RuleInstance {
            id: row.try_get("id")?,
            rule_kind: row.try_get("rule_kind")?,
            target_plant_id: row.try_get("target_plant_id")?,
            raised: row.try_get("raised")?,
        })
    }

    fn alarm_from_row(row: &SqliteRow) -> StorageResult<Alarm> {
        let ordinal: i64 = row.try_get("severity")?;
        let severity = u8::try_from(ordinal)
            .map_err(|_| format!("unknown severity ordinal: {ordinal}"))
            .and_then(Severity::try_from)
            .map_err(StorageError::Decode)?;

        Ok(Alarm {
            id: row.try_get("id")?,
            rule_instance_id: row.try_get("rule_instance_id")?,
            severity,
            message: row.try_get("message")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?)?,
        })
    }
}

#[async_trait]
impl PlantStore for SqliteBackend {
    async fn get_plant(&self, id: i64) -> StorageResult<Option<Plant>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, plant_type_id, sensor_id, last_transplantation_year
            FROM plants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::plant_from_row).transpose()
    }

    async fn get_plant_type(&self, id: i64) -> StorageResult<Option<PlantType>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, temperature_max, temperature_min, light_max, light_min,
                   soil_moisture_max, soil_moisture_min,
                   transplantation_month, transplantation_interval
            FROM plant_types
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::plant_type_from_row).transpose()
    }

    #[instrument(skip(self, plant_type), fields(name = %plant_type.name))]
    async fn insert_plant_type(&self, plant_type: NewPlantType) -> StorageResult<PlantType> {
        let result = sqlx::query(
            r#"
            INSERT INTO plant_types (
                name, temperature_max, temperature_min, light_max, light_min,
                soil_moisture_max, soil_moisture_min,
                transplantation_month, transplantation_interval
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plant_type.name)
        .bind(plant_type.temperature_max)
        .bind(plant_type.temperature_min)
        .bind(plant_type.light_max)
        .bind(plant_type.light_min)
        .bind(plant_type.soil_moisture_max)
        .bind(plant_type.soil_moisture_min)
        .bind(i64::from(plant_type.transplantation_month))
        .bind(i64::from(plant_type.transplantation_interval))
        .execute(&self.pool)
        .await?;

        Ok(plant_type.with_id(result.last_insert_rowid()))
    }

    #[instrument(skip(self, plant), fields(name = %plant.name))]
    async fn insert_plant(&self, plant: NewPlant) -> StorageResult<Plant> {
        let result = sqlx::query(
            r#"
            INSERT INTO plants (name, plant_type_id, sensor_id, last_transplantation_year)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&plant.name)
        .bind(plant.plant_type_id)
        .bind(plant.sensor_id)
        .bind(plant.last_transplantation_year)
        .execute(&self.pool)
        .await?;

        Ok(plant.with_id(result.last_insert_rowid()))
    }

    #[instrument(skip(self))]
    async fn delete_plant(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM plants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MetricStore for SqliteBackend {
    async fn latest_sample(&self, sensor_id: i64) -> StorageResult<Option<MetricSample>> {
        let row = sqlx::query(
            r#"
            SELECT sensor_id, timestamp, temperature, light, soil_moisture
            FROM metric_samples
            WHERE sensor_id = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }

    async fn insert_sample(&self, sample: MetricSample) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_samples (sensor_id, timestamp, temperature, light, soil_moisture)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (sensor_id, timestamp) DO UPDATE SET
                temperature = excluded.temperature,
                light = excluded.light,
                soil_moisture = excluded.soil_moisture
            "#,
        )
        .bind(sample.sensor_id)
        .bind(Self::timestamp_to_millis(&sample.timestamp))
        .bind(sample.temperature)
        .bind(sample.light)
        .bind(sample.soil_moisture)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RuleInstanceStore for SqliteBackend {
    async fn list_rule_instances(&self) -> StorageResult<Vec<RuleInstance>> {
        let rows = sqlx::query(
            "SELECT id, rule_kind, target_plant_id, raised FROM rule_instances ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::rule_instance_from_row).collect()
    }

    async fn list_rule_instances_for_plant(
        &self,
        plant_id: i64,
    ) -> StorageResult<Vec<RuleInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, rule_kind, target_plant_id, raised
            FROM rule_instances
            WHERE target_plant_id = ?
            ORDER BY id
            "#,
        )
        .bind(plant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::rule_instance_from_row).collect()
    }

    async fn get_rule_instance(&self, id: i64) -> StorageResult<Option<RuleInstance>> {
        let row = sqlx::query(
            "SELECT id, rule_kind, target_plant_id, raised FROM rule_instances WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::rule_instance_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn create_rule_instance(
        &self,
        rule_kind: &str,
        target_plant_id: i64,
    ) -> StorageResult<RuleInstance> {
        let result = sqlx::query(
            "INSERT INTO rule_instances (rule_kind, target_plant_id, raised) VALUES (?, ?, 0)",
        )
        .bind(rule_kind)
        .bind(target_plant_id)
        .execute(&self.pool)
        .await?;

        Ok(RuleInstance {
            id: result.last_insert_rowid(),
            rule_kind: rule_kind.to_string(),
            target_plant_id,
            raised: false,
        })
    }

    #[instrument(skip(self))]
    async fn delete_rule_instance(&self, id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM rule_instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_raised(&self, id: i64, raised: bool) -> StorageResult<()> {
        sqlx::query("UPDATE rule_instances SET raised = ? WHERE id = ?")
            .bind(raised)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl AlarmStore for SqliteBackend {
    async fn find_alarm(&self, rule_instance_id: i64) -> StorageResult<Option<Alarm>> {
        let row = sqlx::query(
            r#"
            SELECT id, rule_instance_id, severity, message, created_at
            FROM alarms
            WHERE rule_instance_id = ?
            "#,
        )
        .bind(rule_instance_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::alarm_from_row).transpose()
    }

    #[instrument(skip(self, alarm), fields(rule_instance_id = alarm.rule_instance_id))]
    async fn create_alarm(&self, alarm: NewAlarm) -> StorageResult<Alarm> {
        sqlx::query(
            r#"
            INSERT INTO alarms (rule_instance_id, severity, message, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (rule_instance_id) DO NOTHING
            "#,
        )
        .bind(alarm.rule_instance_id)
        .bind(i64::from(alarm.severity.as_u8()))
        .bind(&alarm.message)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        self.find_alarm(alarm.rule_instance_id).await?.ok_or_else(|| {
            StorageError::QueryFailed(format!(
                "alarm of rule instance {} vanished after insert",
                alarm.rule_instance_id
            ))
        })
    }

    #[instrument(skip(self))]
    async fn delete_alarm(&self, rule_instance_id: i64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM alarms WHERE rule_instance_id = ?")
            .bind(rule_instance_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_alarms_for_plant(
        &self,
        plant_id: i64,
        severity: Option<Severity>,
    ) -> StorageResult<Vec<Alarm>> {
        let severity = severity.map(|s| i64::from(s.as_u8()));

        let rows = sqlx::query(
            r#"
            SELECT a.id, a.rule_instance_id, a.severity, a.message, a.created_at
            FROM alarms a
            JOIN rule_instances r ON r.id = a.rule_instance_id
            WHERE r.target_plant_id = ? AND (? IS NULL OR a.severity = ?)
            ORDER BY a.created_at ASC, a.id ASC
            "#,
        )
        .bind(plant_id)
        .bind(severity)
        .bind(severity)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::alarm_from_row).collect()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
