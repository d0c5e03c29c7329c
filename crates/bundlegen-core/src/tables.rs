//! Appends synthesized rows to the jobs and job-events CSV tables.
//!
//! Column order is a contract with downstream consumers and must match the
//! sample headers in `sample_data/`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::config::GenerationContext;
use crate::error::{BundleError, BundleResult};
use crate::fixtures::{FixtureSet, EVENTS_TABLE, UNIFIED_JOBS_TABLE};
use crate::synth::{self, JobStatus};

/// Playbook run uuid shared by every synthesized event.
const EVENT_UUID: &str = "374c9e9c-561c-4222-acd4-91189dd95b1d";

/// Lower bound for the encoded length of any job or event row.
const MIN_ROW_BYTES: u64 = 128;

/// One synthesized row of `unified_jobs_table.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedJobRow {
    pub job_id: i64,
    pub organization_id: i64,
    pub template_id: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SynthesizedJobRow {
    pub fn synthesize(ctx: &GenerationContext, job_id: i64) -> BundleResult<Self> {
        Ok(Self {
            job_id,
            organization_id: synth::organization_id(ctx, job_id),
            template_id: synth::template_id(ctx, job_id),
            status: synth::job_status(job_id, &ctx.thresholds),
            created_at: synth::timestamp(ctx, job_id, 0)?,
            started_at: synth::timestamp(ctx, job_id, 1)?,
            finished_at: synth::timestamp(ctx, job_id, 5)?,
        })
    }
}

impl fmt::Display for SynthesizedJobRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{id},37,job,{org},organization_{org},{created},job_template_{tpl},{tpl},scheduled,19,localhost,\"\",f,{status},{failed},{started},{finished},4.000,\"\",1",
            id = self.job_id,
            org = self.organization_id,
            created = rfc3339(&self.created_at),
            tpl = self.template_id,
            status = self.status,
            failed = synth::flag(self.status == JobStatus::Failed),
            started = rfc3339(&self.started_at),
            finished = rfc3339(&self.finished_at),
        )
    }
}

/// One synthesized row of `events_table.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedEventRow {
    pub event_global_id: i64,
    pub job_id: i64,
    pub module_id: i64,
    pub host_id: i64,
    pub failed: bool,
    pub changed: bool,
    pub created_at: DateTime<Utc>,
}

impl SynthesizedEventRow {
    pub fn synthesize(ctx: &GenerationContext, job_id: i64, event_id: i64) -> BundleResult<Self> {
        let event_global_id = synth::event_global_id(ctx, job_id, event_id)?;
        Ok(Self {
            event_global_id,
            job_id,
            module_id: synth::module_id(ctx, event_id),
            host_id: synth::host_id(ctx, event_global_id),
            failed: synth::event_failed(event_id),
            changed: synth::event_changed(event_id),
            created_at: synth::timestamp(ctx, job_id, event_id.rem_euclid(60) as u32)?,
        })
    }
}

impl fmt::Display for SynthesizedEventRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{id},{created},{uuid},\"\",verbose_{module},verbose_module_{module},{failed},{changed},\"\",\"\",super_task_{module},\"\",{job},{host},host_{host}",
            id = self.event_global_id,
            created = rfc3339(&self.created_at),
            uuid = EVENT_UUID,
            module = self.module_id,
            failed = synth::flag(self.failed),
            changed = synth::flag(self.changed),
            job = self.job_id,
            host = self.host_id,
        )
    }
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Insert a line break when the sample does not end with one.
fn ensure_line_break(table: &mut Vec<u8>) -> BundleResult<()> {
    if table.last().is_some_and(|b| *b != b'\n') {
        append(table, b"\n")?;
    }
    Ok(())
}

/// Refuse row counts whose table could not be held in memory.
fn check_table_size(ctx: &GenerationContext, table: &str, rows: u64) -> BundleResult<()> {
    let too_large = rows
        .checked_mul(MIN_ROW_BYTES)
        .map_or(true, |bytes| bytes > ctx.max_table_bytes);
    if too_large {
        return Err(BundleError::GenerationFailure {
            message: format!(
                "{} rows for {} exceed the {} byte table limit",
                rows, table, ctx.max_table_bytes
            ),
        });
    }
    Ok(())
}

fn append(table: &mut Vec<u8>, bytes: &[u8]) -> BundleResult<()> {
    table
        .try_reserve(bytes.len())
        .map_err(|e| BundleError::generation("failed to grow table", e))?;
    table.extend_from_slice(bytes);
    Ok(())
}

/// Append `ctx.jobs_count` job rows in ascending `job_id` order.
///
/// Returns the number of appended rows.
pub fn generate_unified_jobs(fixtures: &mut FixtureSet, ctx: &GenerationContext) -> BundleResult<u64> {
    let rows = ctx.jobs_count as u64;
    check_table_size(ctx, UNIFIED_JOBS_TABLE, rows)?;

    let table = fixtures.table_mut(UNIFIED_JOBS_TABLE);
    ensure_line_break(table)?;
    for job_id in 0..ctx.jobs_count {
        ctx.cancel.check()?;
        let row = SynthesizedJobRow::synthesize(ctx, job_id)?;
        append(table, row.to_string().as_bytes())?;
    }

    debug!(rows, "generated unified jobs");
    Ok(rows)
}

/// Append `ctx.events_count` event rows for every job, job-major.
///
/// Returns the number of appended rows.
pub fn generate_job_events(fixtures: &mut FixtureSet, ctx: &GenerationContext) -> BundleResult<u64> {
    let rows = (ctx.jobs_count as u64)
        .checked_mul(ctx.events_count as u64)
        .unwrap_or(u64::MAX);
    check_table_size(ctx, EVENTS_TABLE, rows)?;
    if rows > 0 {
        // ids grow with job and event, so the last row has the largest one
        synth::event_global_id(ctx, ctx.jobs_count - 1, ctx.events_count - 1)?;
    }

    let table = fixtures.table_mut(EVENTS_TABLE);
    ensure_line_break(table)?;
    for job_id in 0..ctx.jobs_count {
        for event_id in 0..ctx.events_count {
            ctx.cancel.check()?;
            let row = SynthesizedEventRow::synthesize(ctx, job_id, event_id)?;
            append(table, row.to_string().as_bytes())?;
        }
    }

    debug!(rows, "generated job events");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BundleConfig;
    use crate::fixtures::sample_bytes;
    use chrono::TimeZone;

    fn ctx(config: &BundleConfig) -> GenerationContext {
        let now = Utc.with_ymd_and_hms(2020, 3, 1, 12, 0, 0).unwrap();
        GenerationContext::new(config, now)
    }

    fn appended_lines(fixtures: &FixtureSet, name: &str) -> Vec<String> {
        let sample = sample_bytes(name).unwrap();
        let table = fixtures.get(name).unwrap();
        assert!(table.starts_with(sample), "sample content must be preserved");
        String::from_utf8(table[sample.len()..].to_vec())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_jobs_appended_in_order() {
        let config = BundleConfig::default().with_volume(250, 0);
        let mut fixtures = FixtureSet::sample();
        assert_eq!(generate_unified_jobs(&mut fixtures, &ctx(&config)).unwrap(), 250);

        let lines = appended_lines(&fixtures, UNIFIED_JOBS_TABLE);
        assert_eq!(lines.len(), 250);
        for (job_id, line) in lines.iter().enumerate() {
            assert!(line.starts_with(&format!("{job_id},")), "{line}");
        }
    }

    #[test]
    fn test_job_row_matches_header() {
        let header = std::str::from_utf8(sample_bytes(UNIFIED_JOBS_TABLE).unwrap()).unwrap();
        let columns = header.trim_end().split(',').count();

        let config = BundleConfig {
            orgs_count: 3,
            templates_count: 4,
            ..BundleConfig::default().with_volume(1, 0)
        };
        let row = SynthesizedJobRow::synthesize(&ctx(&config), 107).unwrap();
        let line = row.to_string();
        assert_eq!(line.trim_end().split(',').count(), columns);
        assert_eq!(
            line,
            "107,37,job,2,organization_2,2020-02-22T01:21:00.840210+00:00,job_template_3,3,scheduled,19,localhost,\"\",f,failed,t,2020-02-22T01:21:01.840210+00:00,2020-02-22T01:21:05.840210+00:00,4.000,\"\",1\n"
        );
    }

    #[test]
    fn test_events_row_count() {
        let config = BundleConfig::default().with_volume(7, 13);
        let mut fixtures = FixtureSet::sample();
        assert_eq!(generate_job_events(&mut fixtures, &ctx(&config)).unwrap(), 91);
        assert_eq!(appended_lines(&fixtures, EVENTS_TABLE).len(), 91);
    }

    #[test]
    fn test_event_row_matches_header() {
        let header = std::str::from_utf8(sample_bytes(EVENTS_TABLE).unwrap()).unwrap();
        let columns = header.trim_end().split(',').count();

        let config = BundleConfig {
            tasks_count: 5,
            hosts_count: 10,
            starting_event_id: 100,
            ..BundleConfig::default().with_volume(2, 4)
        };
        let row = SynthesizedEventRow::synthesize(&ctx(&config), 1, 3).unwrap();
        assert_eq!(row.event_global_id, 108);
        assert_eq!(row.host_id, 8);
        let line = row.to_string();
        assert_eq!(line.trim_end().split(',').count(), columns);
        assert_eq!(
            line,
            "108,2020-02-28T01:21:03.840210+00:00,374c9e9c-561c-4222-acd4-91189dd95b1d,\"\",verbose_3,verbose_module_3,t,t,\"\",\"\",super_task_3,\"\",1,8,host_8\n"
        );
    }

    #[test]
    fn test_zero_counts_leave_tables_untouched() {
        let config = BundleConfig::default().with_volume(0, 50);
        let zero_jobs = ctx(&config);
        let mut fixtures = FixtureSet::sample();
        assert_eq!(generate_unified_jobs(&mut fixtures, &zero_jobs).unwrap(), 0);
        assert_eq!(generate_job_events(&mut fixtures, &zero_jobs).unwrap(), 0);

        let negative = BundleConfig::default().with_volume(5, -2);
        assert_eq!(generate_job_events(&mut fixtures, &ctx(&negative)).unwrap(), 0);
        assert_eq!(fixtures, FixtureSet::sample());
    }

    #[test]
    fn test_missing_trailing_newline_is_repaired() {
        let mut fixtures = FixtureSet::sample();
        fixtures.set(UNIFIED_JOBS_TABLE, b"id,status".to_vec());
        let config = BundleConfig::default().with_volume(1, 0);
        generate_unified_jobs(&mut fixtures, &ctx(&config)).unwrap();

        let table = std::str::from_utf8(fixtures.get(UNIFIED_JOBS_TABLE).unwrap()).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("id,status"));
        assert!(lines.next().unwrap().starts_with("0,37,job,"));
    }

    #[test]
    fn test_huge_job_count_is_refused_without_allocating() {
        let config = BundleConfig::default().with_volume(1 << 45, 0);
        let mut fixtures = FixtureSet::sample();
        let err = generate_unified_jobs(&mut fixtures, &ctx(&config)).unwrap_err();
        assert!(matches!(err, BundleError::GenerationFailure { .. }), "{err:?}");
        assert_eq!(fixtures, FixtureSet::sample());
    }

    #[test]
    fn test_huge_event_product_is_refused() {
        for (jobs, events) in [(1 << 20, 1 << 20), (i64::MAX, i64::MAX)] {
            let config = BundleConfig::default().with_volume(jobs, events);
            let mut fixtures = FixtureSet::sample();
            let err = generate_job_events(&mut fixtures, &ctx(&config)).unwrap_err();
            assert!(matches!(err, BundleError::GenerationFailure { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_table_limit_is_configurable() {
        let config = BundleConfig::default().with_volume(10, 10);
        let small = ctx(&config).with_max_table_bytes(10 * MIN_ROW_BYTES);
        let mut fixtures = FixtureSet::sample();
        assert_eq!(generate_unified_jobs(&mut fixtures, &small).unwrap(), 10);
        assert!(generate_job_events(&mut fixtures, &small).is_err());
    }

    #[test]
    fn test_event_id_overflow_fails_before_appending() {
        let config = BundleConfig {
            starting_event_id: i64::MAX - 3,
            ..BundleConfig::default().with_volume(2, 2)
        };
        let mut fixtures = FixtureSet::sample();
        let err = generate_job_events(&mut fixtures, &ctx(&config)).unwrap_err();
        assert!(matches!(err, BundleError::GenerationFailure { .. }));
        assert_eq!(fixtures, FixtureSet::sample());
    }

    #[test]
    fn test_cancelled_generation_stops() {
        let config = BundleConfig::default().with_volume(5, 5);
        let ctx = ctx(&config);
        ctx.cancel.cancel();
        let mut fixtures = FixtureSet::sample();
        assert!(generate_unified_jobs(&mut fixtures, &ctx)
            .unwrap_err()
            .is_cancelled());
        assert!(generate_job_events(&mut fixtures, &ctx)
            .unwrap_err()
            .is_cancelled());
    }
}
