//! Synthetic analytics bundle generation.
//!
//! This crate turns a small set of shipped sample fixtures into a bundle of
//! CSV/JSON files mimicking a job-execution system's usage telemetry:
//!
//! - Deterministic row synthesis (timestamps, statuses, event flags, ids)
//! - Append-only generation of the jobs and job-events tables
//! - Identity overrides for `config.json`
//! - Packing into `{bundle_id}.tar.gz` with write-then-rename
//! - A filesystem registry with `.done` marker files for the bundle lifecycle
//! - Upload notifications through a pluggable [`Publisher`]
//!
//! # Quick Start
//!
//! ```no_run
//! use bundlegen_core::{generate_bundle, BundleConfig, BundleRegistry, GenerationContext};
//!
//! # fn example() -> Result<(), bundlegen_core::BundleError> {
//! let registry = BundleRegistry::new("/var/lib/bundles");
//! let mut config = BundleConfig::default().with_volume(1000, 50);
//! config.mint_bundle_uuid();
//!
//! let ctx = GenerationContext::now(&config);
//! let bundle = generate_bundle(&config, &ctx, &registry)?;
//! println!("{} ({} bytes)", bundle.path.display(), bundle.size);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod assemble;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod notify;
pub mod patch;
pub mod registry;
pub mod synth;
pub mod tables;

pub use assemble::{build_fixtures, generate_bundle, generate_bundle_in, GeneratedBundle};
pub use config::{
    new_bundle_id, BundleConfig, CancelToken, GenerationContext, StatusThresholds,
    DEFAULT_MAX_TABLE_BYTES,
};
pub use error::{BundleError, BundleResult};
pub use fixtures::{FixtureSet, FIXTURE_FILES};
pub use notify::{
    callback_url, MemoryPublisher, Notifier, PublishError, Publisher, UploadPayload,
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_TOPIC,
};
pub use patch::patch_config;
pub use registry::{classify, validate_bundle_id, BundleRegistry, BundleState, BundlesByState};
pub use synth::JobStatus;
pub use tables::{generate_job_events, generate_unified_jobs, SynthesizedEventRow, SynthesizedJobRow};
