//! HTTP handlers.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bundlegen_core::{
    generate_bundle, BundleConfig, BundleError, BundleRegistry, BundleState, CancelToken,
    GenerationContext, UploadPayload,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::AppState;

/// Bundle id meaning "every purgeable bundle" on delete.
pub const PROCESSED_SENTINEL: &str = "processed";

/// Accepts `true`/`false` in any case and `1`/`0`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean: {other}"
        ))),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateQuery {
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub process: bool,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    #[serde(default)]
    pub tenant_id: i64,
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub scheduled: Vec<String>,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello World" }))
}

/// `POST /bundles/`: generate a bundle and optionally announce it.
pub async fn create_bundle(
    State(state): State<AppState>,
    Query(query): Query<CreateQuery>,
    Json(mut config): Json<BundleConfig>,
) -> ApiResult<Json<BundleConfig>> {
    config.mint_bundle_uuid();
    info!(
        bundle_id = %config.bundle_uuid,
        unified_jobs = config.unified_jobs,
        job_events = config.job_events,
        process = query.process,
        "creating bundle"
    );

    let config = generate(config, state.registry.clone(), state.generation_timeout).await?;

    if query.process {
        state
            .notifier
            .notify(
                &state.base_url,
                &config.account_id,
                config.tenant_id,
                &config.bundle_uuid,
            )
            .await?;
    }
    Ok(Json(config))
}

/// Run generation on the blocking pool, bounded by `timeout`.
///
/// On expiry the run is cancelled and awaited, so no archive appears after
/// the caller was told generation failed. A run that finished in the
/// meantime is kept.
async fn generate(
    config: BundleConfig,
    registry: BundleRegistry,
    timeout: Duration,
) -> Result<BundleConfig, BundleError> {
    let cancel = CancelToken::new();
    let ctx = GenerationContext::now(&config).with_cancel(cancel.clone());
    let mut task = tokio::task::spawn_blocking(move || {
        generate_bundle(&config, &ctx, &registry).map(|_| config)
    });

    let outcome = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            cancel.cancel();
            warn!(timeout = ?timeout, "bundle generation timed out, cancelling");
            match task.await {
                Ok(Err(e)) if e.is_cancelled() => {
                    return Err(BundleError::GenerationTimeout { timeout })
                }
                joined => joined,
            }
        }
    };

    outcome.map_err(|join_err| BundleError::GenerationFailure {
        message: format!("generation task failed: {}", join_err),
    })?
}

/// `GET /bundles/`: list pending and done bundles, purge done ones in the
/// background.
pub async fn list_bundles(State(state): State<AppState>) -> ApiResult<Json<Vec<BundleState>>> {
    let by_state = state.registry.classify_all().await?;
    schedule_purge(&state.registry, by_state.purgeable.clone());
    Ok(Json(by_state.states()))
}

/// `GET /bundles/{id}`: download the archive, optionally marking it done.
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let bytes = state.registry.read(&bundle_id).await?;
    if query.done {
        state.registry.mark_done(&bundle_id).await?;
    }
    debug!(bundle_id = %bundle_id, size = bytes.len(), done = query.done, "serving bundle");

    let disposition = format!("attachment; filename=\"{}.tar.gz\"", bundle_id);
    Ok((
        [
            (CONTENT_TYPE, "application/gzip".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `DELETE /bundles/`: purge every purgeable bundle.
pub async fn delete_processed(State(state): State<AppState>) -> ApiResult<Json<DeleteResponse>> {
    delete_bundle(State(state), Path(PROCESSED_SENTINEL.to_string())).await
}

/// `DELETE /bundles/{id}`: purge one bundle, or all purgeable ones for the
/// `processed` sentinel.
pub async fn delete_bundle(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let ids = if bundle_id == PROCESSED_SENTINEL {
        state.registry.classify_all().await?.purgeable
    } else {
        if !state.registry.exists(&bundle_id).await? {
            return Err(BundleError::NotFound { bundle_id }.into());
        }
        vec![bundle_id]
    };

    schedule_purge(&state.registry, ids.clone());
    Ok(Json(DeleteResponse { scheduled: ids }))
}

/// `GET /process/{id}`: announce an existing bundle.
pub async fn process_bundle(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
    Query(query): Query<ProcessQuery>,
) -> ApiResult<Json<UploadPayload>> {
    let payload = state
        .notifier
        .notify(&state.base_url, &query.account_id, query.tenant_id, &bundle_id)
        .await?;
    Ok(Json(payload))
}

fn schedule_purge(registry: &BundleRegistry, ids: Vec<String>) {
    if ids.is_empty() {
        return;
    }
    let registry = registry.clone();
    tokio::spawn(async move {
        let removed = registry.purge(&ids).await;
        info!(requested = ids.len(), removed, "background purge finished");
    });
}
