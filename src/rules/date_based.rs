//! Calendar rules: due once per interval, sticky once raised
//!
//! ```text
//! last_check_date ──(+ interval years, target month, day 15, 13:00 UTC)──▶ next_check_date
//!
//! check(now):
//!   now >  next_check_date → true,  last := next, next := last + interval
//!   now <= next_check_date → false, no change
//! ```
//!
//! The cursor advances by exactly one interval per positive check, so a plant
//! that is several intervals overdue reports one due date per check.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::{debug, trace};

use super::{Rule, RuleContext, RuleError};
use crate::storage::{Severity, StorageResult};

pub const TRANSPLANTATION: &str = "transplantation";

/// Day of month of every due date
const DUE_DAY: u32 = 15;

/// Hour (UTC) of every due date
const DUE_HOUR: u32 = 13;

/// A rule that becomes due on a fixed day every `interval` years
#[derive(Debug, Clone)]
pub struct DateBasedRule {
    kind: &'static str,
    plant_id: i64,
    month: u32,

    /// Interval in months, always a whole number of years
    interval_months: u32,

    last_check_date: DateTime<Utc>,
    next_check_date: DateTime<Utc>,
    severity: Severity,
    message: String,
}

impl DateBasedRule {
    /// Build a rule whose next due date is `interval_years` after
    /// `last_check_date`, in `month`
    pub fn new(
        kind: &'static str,
        plant_id: i64,
        last_check_date: DateTime<Utc>,
        interval_years: u32,
        month: u32,
        message: String,
    ) -> Result<Self, RuleError> {
        if interval_years == 0 {
            return Err(RuleError::InvalidSchedule(format!(
                "plant {plant_id}: interval must be at least one year"
            )));
        }

        let interval_months = interval_years.checked_mul(12).ok_or_else(|| {
            RuleError::InvalidSchedule(format!(
                "plant {plant_id}: interval of {interval_years} years is too large"
            ))
        })?;

        let next_check_date = due_date(last_check_date.year(), interval_months, month)
            .ok_or_else(|| {
                RuleError::InvalidSchedule(format!(
                    "plant {plant_id}: no due date in month {month}"
                ))
            })?;

        Ok(Self {
            kind,
            plant_id,
            month,
            interval_months,
            last_check_date,
            next_check_date,
            severity: Severity::default(),
            message,
        })
    }

    /// Transplantation schedule of the context's plant
    ///
    /// The plant was last transplanted in its type's transplantation month of
    /// `last_transplantation_year`.
    pub async fn transplantation(ctx: RuleContext) -> Result<Self, RuleError> {
        let plant_type = ctx.plant_type().await?;
        let month = plant_type.transplantation_month;

        let last_transplantation = Utc
            .with_ymd_and_hms(
                ctx.plant.last_transplantation_year,
                month,
                DUE_DAY,
                DUE_HOUR,
                0,
                0,
            )
            .single()
            .ok_or_else(|| {
                RuleError::InvalidSchedule(format!(
                    "plant {}: transplantation month {month} of {} is not a date",
                    ctx.plant.id, ctx.plant.last_transplantation_year
                ))
            })?;

        debug!(
            "initializing transplantation rule for plant {} ({} every {} years)",
            ctx.plant.id, month, plant_type.transplantation_interval
        );

        Self::new(
            TRANSPLANTATION,
            ctx.plant.id,
            last_transplantation,
            plant_type.transplantation_interval,
            month,
            format!("{}: time to transplant into a bigger pot", ctx.plant.name),
        )
    }

    pub fn last_check_date(&self) -> DateTime<Utc> {
        self.last_check_date
    }

    pub fn next_check_date(&self) -> DateTime<Utc> {
        self.next_check_date
    }
}

/// Day 15, 13:00 UTC of `month`, `interval_months / 12` years after `year`
fn due_date(year: i32, interval_months: u32, month: u32) -> Option<DateTime<Utc>> {
    let years = i32::try_from(interval_months / 12).ok()?;
    Utc.with_ymd_and_hms(year.checked_add(years)?, month, DUE_DAY, DUE_HOUR, 0, 0)
        .single()
}

#[async_trait]
impl Rule for DateBasedRule {
    fn kind(&self) -> &str {
        self.kind
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn is_sticky(&self) -> bool {
        true
    }

    async fn check(&mut self, now: DateTime<Utc>) -> StorageResult<bool> {
        if now <= self.next_check_date {
            trace!(
                "plant {}: {} not due before {}",
                self.plant_id, self.kind, self.next_check_date
            );
            return Ok(false);
        }

        // a due date whose successor is unrepresentable stays put; the alarm
        // is sticky anyway
        if let Some(next) = due_date(self.next_check_date.year(), self.interval_months, self.month)
        {
            self.last_check_date = self.next_check_date;
            self.next_check_date = next;
        }

        debug!(
            "plant {}: {} due, next due date {}",
            self.plant_id, self.kind, self.next_check_date
        );
        Ok(true)
    }
}
