//! Bundle assembly: fixtures → scratch directory → archive.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::archive;
use crate::config::{BundleConfig, GenerationContext};
use crate::error::{BundleError, BundleResult};
use crate::fixtures::{FixtureSet, FIXTURE_FILES};
use crate::patch::patch_config;
use crate::registry::BundleRegistry;
use crate::tables::{generate_job_events, generate_unified_jobs};

/// Outcome of one bundle generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBundle {
    pub bundle_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub jobs: u64,
    pub events: u64,
}

/// Build the complete in-memory fixture set for `config`.
///
/// Returns the fixtures together with the number of job and event rows
/// appended.
pub fn build_fixtures(
    config: &BundleConfig,
    ctx: &GenerationContext,
) -> BundleResult<(FixtureSet, u64, u64)> {
    let mut fixtures = FixtureSet::sample();
    patch_config(&mut fixtures, config)?;
    let jobs = generate_unified_jobs(&mut fixtures, ctx)?;
    let events = generate_job_events(&mut fixtures, ctx)?;
    Ok((fixtures, jobs, events))
}

/// Generate the bundle described by `config` into the registry directory.
///
/// # Process
///
/// 1. Copy the sample fixtures
/// 2. Apply `config.json` overrides
/// 3. Append jobs, then events
/// 4. Write every fixture into a fresh scratch directory
/// 5. Pack the scratch directory into `{bundle_uuid}.tar.gz`
/// 6. Drop the scratch directory
///
/// The scratch directory is removed on every path. A failed or cancelled
/// pack leaves no archive under the final name.
pub fn generate_bundle(
    config: &BundleConfig,
    ctx: &GenerationContext,
    registry: &BundleRegistry,
) -> BundleResult<GeneratedBundle> {
    generate_bundle_in(config, ctx, registry, &std::env::temp_dir())
}

/// [`generate_bundle`] with the scratch directory created under
/// `scratch_root`.
pub fn generate_bundle_in(
    config: &BundleConfig,
    ctx: &GenerationContext,
    registry: &BundleRegistry,
    scratch_root: &Path,
) -> BundleResult<GeneratedBundle> {
    let start = Instant::now();
    let archive_path = registry.locate(&config.bundle_uuid)?;

    let (fixtures, jobs, events) = build_fixtures(config, ctx)?;

    let scratch = tempfile::Builder::new()
        .prefix("bundlegen-")
        .tempdir_in(scratch_root)
        .map_err(|e| BundleError::generation("failed to create scratch directory", e))?;
    for (name, content) in fixtures.iter() {
        ctx.cancel.check()?;
        fs::write(scratch.path().join(name), content)
            .map_err(|e| BundleError::generation(&format!("failed to write {}", name), e))?;
    }
    debug!(scratch = %scratch.path().display(), "fixtures written");

    fs::create_dir_all(registry.dir())
        .map_err(|e| BundleError::generation("failed to create storage directory", e))?;
    let size = archive::pack_files(&archive_path, scratch.path(), &FIXTURE_FILES, &ctx.cancel)?;

    info!(
        bundle_id = %config.bundle_uuid,
        bundle = %archive_path.display(),
        size,
        jobs,
        events,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "bundle created"
    );

    Ok(GeneratedBundle {
        bundle_id: config.bundle_uuid.clone(),
        path: archive_path,
        size,
        jobs,
        events,
    })
}
