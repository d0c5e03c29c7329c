//! Kafka REST proxy publisher.
//!
//! Messages are produced with `POST {base}/topics/{topic}` using the JSON
//! embedded format of the v2 REST API.

use std::time::Duration;

use async_trait::async_trait;
use bundlegen_core::{PublishError, Publisher, UploadPayload};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::debug;

const USER_AGENT_VALUE: &str = concat!("bundlegen-server/", env!("CARGO_PKG_VERSION"));
const KAFKA_JSON_V2: &str = "application/vnd.kafka.json.v2+json";
const KAFKA_V2: &str = "application/vnd.kafka.v2+json";

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: [ProduceRecord<'a>; 1],
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    value: &'a UploadPayload,
}

/// Publisher backed by a Kafka REST proxy.
#[derive(Debug, Clone)]
pub struct RestProxyPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl RestProxyPublisher {
    /// Create a publisher for the proxy at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(ACCEPT, HeaderValue::from_static(KAFKA_V2));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| PublishError::Transport {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Publisher for RestProxyPublisher {
    async fn publish(&self, topic: &str, payload: &UploadPayload) -> Result<(), PublishError> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        debug!(url = %url, request_id = %payload.request_id, "producing message");

        let body = serde_json::to_vec(&ProduceRequest {
            records: [ProduceRecord { value: payload }],
        })
        .map_err(|e| PublishError::Transport {
            message: format!("failed to serialize payload: {}", e),
        })?;

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, KAFKA_JSON_V2)
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(PublishError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
