//! Deterministic per-row field derivation.
//!
//! Every function here is pure: the same index and context always yield the
//! same value. Derivations that can leave the representable range return
//! `GenerationFailure` instead of wrapping.

use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};

use crate::config::{GenerationContext, StatusThresholds};
use crate::error::{BundleError, BundleResult};

/// Sub-second part shared by every synthesized timestamp.
const TIMESTAMP_MICROS: u32 = 840_210;

/// Status label of a unified job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Successful,
    Failed,
    Pending,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp of row `index`: `now` minus `index mod spread + starting_day`
/// days, at 01:21:`extra_seconds`.840210 UTC.
pub fn timestamp(
    ctx: &GenerationContext,
    index: i64,
    extra_seconds: u32,
) -> BundleResult<DateTime<Utc>> {
    let date = index
        .rem_euclid(ctx.spread_days_back)
        .checked_add(ctx.starting_day)
        .and_then(Duration::try_days)
        .and_then(|days_ago| ctx.now.checked_sub_signed(days_ago))
        .ok_or_else(|| BundleError::GenerationFailure {
            message: format!(
                "timestamp of row {} out of range (starting_day = {})",
                index, ctx.starting_day
            ),
        })?
        .date_naive();
    let time = NaiveTime::from_hms_micro_opt(1, 21, extra_seconds % 60, TIMESTAMP_MICROS)
        .unwrap_or(NaiveTime::MIN);
    Ok(date.and_time(time).and_utc())
}

/// [`timestamp`] rendered as RFC 3339 with microseconds and `+00:00`.
pub fn render_timestamp(
    ctx: &GenerationContext,
    index: i64,
    extra_seconds: u32,
) -> BundleResult<String> {
    timestamp(ctx, index, extra_seconds).map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, false))
}

/// Status of `job_id`; tiers are checked failed → pending → error.
pub fn job_status(job_id: i64, thresholds: &StatusThresholds) -> JobStatus {
    let bucket = job_id.rem_euclid(thresholds.modulo.max(1));
    let reached = |threshold: i64| threshold >= 0 && bucket >= threshold;

    if reached(thresholds.failed) {
        JobStatus::Failed
    } else if reached(thresholds.pending) {
        JobStatus::Pending
    } else if reached(thresholds.error) {
        JobStatus::Error
    } else {
        JobStatus::Successful
    }
}

/// Half of the events are failed: `event_id mod 4` in {2, 3}.
pub fn event_failed(event_id: i64) -> bool {
    !matches!(event_id.rem_euclid(4), 0 | 1)
}

/// Every second failed and non-failed event is changed: `event_id mod 4` in {1, 3}.
pub fn event_changed(event_id: i64) -> bool {
    !matches!(event_id.rem_euclid(4), 0 | 2)
}

/// CSV boolean literal.
pub fn flag(value: bool) -> char {
    if value {
        't'
    } else {
        'f'
    }
}

/// Global event id, unique across all jobs of a run.
pub fn event_global_id(ctx: &GenerationContext, job_id: i64, event_id: i64) -> BundleResult<i64> {
    ctx.events_count
        .checked_add(1)
        .and_then(|stride| stride.checked_mul(job_id))
        .and_then(|id| id.checked_add(event_id))
        .and_then(|id| id.checked_add(ctx.starting_event_id))
        .ok_or_else(|| BundleError::GenerationFailure {
            message: format!(
                "event id of job {} event {} overflows (starting_event_id = {})",
                job_id, event_id, ctx.starting_event_id
            ),
        })
}

pub fn organization_id(ctx: &GenerationContext, job_id: i64) -> i64 {
    job_id.rem_euclid(ctx.orgs_count)
}

pub fn template_id(ctx: &GenerationContext, job_id: i64) -> i64 {
    job_id.rem_euclid(ctx.templates_count)
}

pub fn module_id(ctx: &GenerationContext, event_id: i64) -> i64 {
    event_id.rem_euclid(ctx.tasks_count)
}

pub fn host_id(ctx: &GenerationContext, global_id: i64) -> i64 {
    global_id.rem_euclid(ctx.hosts_count)
}
