//! Bundle request parameters and the immutable generation context derived
//! from them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};

/// Modulus the status thresholds are compared against by default.
pub const DEFAULT_STATUS_MODULO: i64 = 200;

/// Upper bound for one generated table held in memory (2 GiB).
pub const DEFAULT_MAX_TABLE_BYTES: u64 = 2 << 30;

/// Parameters controlling one bundle generation.
///
/// Every field is optional on the wire; missing fields take the defaults
/// below. Non-positive row counts generate no rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Number of unified jobs to append.
    #[serde(default = "default_unified_jobs")]
    pub unified_jobs: i64,

    /// Number of events appended per job.
    #[serde(default = "default_job_events")]
    pub job_events: i64,

    /// Distinct task/module ids referenced by events.
    #[serde(default = "default_tasks_count")]
    pub tasks_count: i64,

    /// Distinct organizations referenced by jobs.
    #[serde(default = "default_orgs_count")]
    pub orgs_count: i64,

    /// Distinct job templates referenced by jobs.
    #[serde(default = "default_templates_count")]
    pub templates_count: i64,

    /// Distinct hosts referenced by events.
    #[serde(default = "default_hosts_count")]
    pub hosts_count: i64,

    /// Width of the window (in days) timestamps are spread over.
    #[serde(default = "default_spread_days_back")]
    pub spread_days_back: i64,

    /// How many days back the newest row is dated.
    #[serde(default = "default_starting_day")]
    pub starting_day: i64,

    /// Lower bound of the `failed` tier, `-1` disables it.
    #[serde(default = "default_failed_job_threshold")]
    pub failed_job_threshold: i64,

    /// Lower bound of the `pending` tier, `-1` disables it.
    #[serde(default = "disabled_threshold")]
    pub pending_job_threshold: i64,

    /// Lower bound of the `error` tier, `-1` disables it.
    #[serde(default = "disabled_threshold")]
    pub error_job_threshold: i64,

    /// Modulus applied to the job id before comparing against thresholds.
    #[serde(default = "default_failed_job_modulo")]
    pub failed_job_modulo: i64,

    /// Offset added to every event's global id.
    #[serde(default)]
    pub starting_event_id: i64,

    /// Installation id override for `config.json`.
    #[serde(default)]
    pub install_uuid: String,

    /// Instance id override for `config.json`.
    #[serde(default)]
    pub instance_uuid: String,

    /// Base URL override for `config.json`.
    #[serde(default)]
    pub tower_url_base: String,

    /// Bundle identifier, minted by the service for every request.
    #[serde(default, alias = "uuid")]
    pub bundle_uuid: String,

    /// Tenant the bundle is attributed to.
    #[serde(default)]
    pub tenant_id: i64,

    /// Account the bundle is attributed to.
    #[serde(default)]
    pub account_id: String,
}

fn default_unified_jobs() -> i64 {
    100
}

fn default_job_events() -> i64 {
    100
}

fn default_tasks_count() -> i64 {
    100
}

fn default_orgs_count() -> i64 {
    10
}

fn default_templates_count() -> i64 {
    10
}

fn default_hosts_count() -> i64 {
    100
}

fn default_spread_days_back() -> i64 {
    100
}

fn default_starting_day() -> i64 {
    1
}

fn default_failed_job_threshold() -> i64 {
    100
}

fn disabled_threshold() -> i64 {
    -1
}

fn default_failed_job_modulo() -> i64 {
    DEFAULT_STATUS_MODULO
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            unified_jobs: default_unified_jobs(),
            job_events: default_job_events(),
            tasks_count: default_tasks_count(),
            orgs_count: default_orgs_count(),
            templates_count: default_templates_count(),
            hosts_count: default_hosts_count(),
            spread_days_back: default_spread_days_back(),
            starting_day: default_starting_day(),
            failed_job_threshold: default_failed_job_threshold(),
            pending_job_threshold: disabled_threshold(),
            error_job_threshold: disabled_threshold(),
            failed_job_modulo: default_failed_job_modulo(),
            starting_event_id: 0,
            install_uuid: String::new(),
            instance_uuid: String::new(),
            tower_url_base: String::new(),
            bundle_uuid: String::new(),
            tenant_id: 0,
            account_id: String::new(),
        }
    }
}

impl BundleConfig {
    /// Set the number of jobs and events per job.
    pub fn with_volume(mut self, unified_jobs: i64, job_events: i64) -> Self {
        self.unified_jobs = unified_jobs;
        self.job_events = job_events;
        self
    }

    /// Set the bundle identifier.
    pub fn with_bundle_uuid(mut self, bundle_uuid: impl Into<String>) -> Self {
        self.bundle_uuid = bundle_uuid.into();
        self
    }

    /// Replace `bundle_uuid` with a freshly minted identifier and return it.
    pub fn mint_bundle_uuid(&mut self) -> &str {
        self.bundle_uuid = new_bundle_id();
        &self.bundle_uuid
    }
}

/// Mint a collision-resistant bundle id: 128 random bits as 32 hex chars.
pub fn new_bundle_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Ordered status tiers evaluated against `job_id mod modulo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusThresholds {
    pub failed: i64,
    pub pending: i64,
    pub error: i64,
    pub modulo: i64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            failed: default_failed_job_threshold(),
            pending: disabled_threshold(),
            error: disabled_threshold(),
            modulo: DEFAULT_STATUS_MODULO,
        }
    }
}

/// Shared flag asking a running generation to stop.
///
/// Clones observe the same flag. Generation checks it between rows and
/// before the archive is moved into place.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) was called.
    pub fn check(&self) -> BundleResult<()> {
        if self.is_cancelled() {
            Err(BundleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Immutable parameters threaded through one generation run.
///
/// Built once from a [`BundleConfig`]; `now` is captured at that point so all
/// rows of a run share the same reference instant. Moduli are clamped to at
/// least 1.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub now: DateTime<Utc>,
    pub jobs_count: i64,
    pub events_count: i64,
    pub tasks_count: i64,
    pub orgs_count: i64,
    pub templates_count: i64,
    pub hosts_count: i64,
    pub spread_days_back: i64,
    pub starting_day: i64,
    pub starting_event_id: i64,
    pub thresholds: StatusThresholds,
    /// Tables estimated to grow past this many bytes are refused up front.
    pub max_table_bytes: u64,
    pub cancel: CancelToken,
}

impl GenerationContext {
    /// Build a context for `config` anchored at `now`.
    pub fn new(config: &BundleConfig, now: DateTime<Utc>) -> Self {
        let modulo = if config.failed_job_modulo > 0 {
            config.failed_job_modulo
        } else {
            DEFAULT_STATUS_MODULO
        };

        Self {
            now,
            jobs_count: config.unified_jobs.max(0),
            events_count: config.job_events.max(0),
            tasks_count: config.tasks_count.max(1),
            orgs_count: config.orgs_count.max(1),
            templates_count: config.templates_count.max(1),
            hosts_count: config.hosts_count.max(1),
            spread_days_back: config.spread_days_back.max(1),
            starting_day: config.starting_day,
            starting_event_id: config.starting_event_id,
            thresholds: StatusThresholds {
                failed: config.failed_job_threshold,
                pending: config.pending_job_threshold,
                error: config.error_job_threshold,
                modulo,
            },
            max_table_bytes: DEFAULT_MAX_TABLE_BYTES,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_max_table_bytes(mut self, max_table_bytes: u64) -> Self {
        self.max_table_bytes = max_table_bytes;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build a context anchored at the current instant.
    pub fn now(config: &BundleConfig) -> Self {
        Self::new(config, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_takes_defaults() {
        let config: BundleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BundleConfig::default());
        assert_eq!(config.failed_job_threshold, 100);
        assert_eq!(config.pending_job_threshold, -1);
    }

    #[test]
    fn test_legacy_uuid_alias() {
        let config: BundleConfig =
            serde_json::from_str(r#"{"uuid": "abc", "unified_jobs": 3}"#).unwrap();
        assert_eq!(config.bundle_uuid, "abc");
        assert_eq!(config.unified_jobs, 3);
        assert_eq!(config.job_events, 100);
    }

    #[test]
    fn test_minted_ids_are_32_hex_and_unique() {
        let mut config = BundleConfig::default();
        let first = config.mint_bundle_uuid().to_string();
        let second = new_bundle_id();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_context_clamps_counts() {
        let config = BundleConfig {
            unified_jobs: -5,
            job_events: 0,
            orgs_count: 0,
            hosts_count: -1,
            spread_days_back: 0,
            failed_job_modulo: 0,
            ..Default::default()
        };
        let ctx = GenerationContext::now(&config);
        assert_eq!(ctx.jobs_count, 0);
        assert_eq!(ctx.events_count, 0);
        assert_eq!(ctx.orgs_count, 1);
        assert_eq!(ctx.hosts_count, 1);
        assert_eq!(ctx.spread_days_back, 1);
        assert_eq!(ctx.thresholds.modulo, DEFAULT_STATUS_MODULO);
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let ctx = GenerationContext::now(&BundleConfig::default()).with_cancel(token.clone());
        assert!(ctx.cancel.check().is_ok());

        token.cancel();
        assert!(ctx.cancel.is_cancelled());
        assert!(ctx.cancel.check().unwrap_err().is_cancelled());
    }
}
