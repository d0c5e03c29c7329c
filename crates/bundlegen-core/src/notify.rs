//! Upload notifications for produced bundles.
//!
//! The notifier builds a fixed-shape payload and hands it to a [`Publisher`].
//! The publisher is optional: a service started without a reachable message
//! bus still generates and serves bundles, and notification requests fail
//! with [`BundleError::TransportUnavailable`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{BundleError, BundleResult};
use crate::registry::BundleRegistry;

/// Topic upload notifications are published on.
pub const DEFAULT_TOPIC: &str = "platform.upload.tower";

/// Upper bound for one publish call.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Message announcing that a bundle is ready for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub account: String,
    pub b64_identity: String,
    pub category: String,
    pub metadata: BTreeMap<String, String>,
    pub principal: i64,
    pub request_id: String,
    pub service: String,
    pub size: u64,
    pub timestamp: String,
    pub url: String,
}

impl UploadPayload {
    pub fn new(base_url: &str, account_id: &str, tenant_id: i64, bundle_id: &str, size: u64) -> Self {
        Self {
            account: account_id.to_string(),
            b64_identity: "__=".to_string(),
            category: "analytics".to_string(),
            metadata: BTreeMap::new(),
            principal: tenant_id,
            request_id: bundle_id.to_string(),
            service: "tower".to_string(),
            size,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            url: callback_url(base_url, bundle_id),
        }
    }
}

/// Download URL that also marks the bundle done.
pub fn callback_url(base_url: &str, bundle_id: &str) -> String {
    format!(
        "{}/bundles/{}?done=True",
        base_url.trim_end_matches('/'),
        bundle_id
    )
}

/// Publisher failures.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The broker could not be reached.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The broker answered but refused the message.
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Capability to put a JSON message on a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &UploadPayload) -> Result<(), PublishError>;
}

/// Sends upload notifications for bundles in a registry.
#[derive(Clone)]
pub struct Notifier {
    registry: BundleRegistry,
    publisher: Option<Arc<dyn Publisher>>,
    topic: String,
    timeout: Duration,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("registry", &self.registry)
            .field("publisher", &self.publisher.is_some())
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Notifier {
    pub fn new(registry: BundleRegistry, publisher: Option<Arc<dyn Publisher>>) -> Self {
        Self {
            registry,
            publisher,
            topic: DEFAULT_TOPIC.to_string(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a publisher is configured.
    pub fn is_available(&self) -> bool {
        self.publisher.is_some()
    }

    /// Publish the upload notification for `bundle_id`.
    ///
    /// The archive size is read now, not at generation time.
    pub async fn notify(
        &self,
        base_url: &str,
        account_id: &str,
        tenant_id: i64,
        bundle_id: &str,
    ) -> BundleResult<UploadPayload> {
        debug!(bundle_id, "notify upload");
        let size = self.registry.size(bundle_id).await?;
        let payload = UploadPayload::new(base_url, account_id, tenant_id, bundle_id, size);

        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| BundleError::TransportUnavailable {
                message: "no publisher initialized".to_string(),
            })?;

        match tokio::time::timeout(self.timeout, publisher.publish(&self.topic, &payload)).await {
            Ok(Ok(())) => {
                info!(bundle_id, topic = %self.topic, size, "upload notification sent");
                Ok(payload)
            }
            Ok(Err(e)) => {
                error!(bundle_id, topic = %self.topic, error = %e, "failed to publish upload notification");
                Err(BundleError::PublishFailed {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                error!(bundle_id, topic = %self.topic, timeout = ?self.timeout, "upload notification timed out");
                Err(BundleError::PublishFailed {
                    message: format!("timed out after {:?}", self.timeout),
                })
            }
        }
    }
}

/// Publisher that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<(String, UploadPayload)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, as `(topic, payload)`.
    pub fn messages(&self) -> Vec<(String, UploadPayload)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: &UploadPayload) -> Result<(), PublishError> {
        self.messages
            .lock()
            .map_err(|e| PublishError::Transport {
                message: e.to_string(),
            })?
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }
}
