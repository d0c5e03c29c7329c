#![forbid(unsafe_code)]
//! HTTP service around `bundlegen-core`.
//!
//! | Method | Path | Action |
//! |--------|------|--------|
//! | `GET` | `/` | liveness |
//! | `POST` | `/bundles/?process=` | generate (and announce) a bundle |
//! | `GET` | `/bundles/` | list bundles, purge done ones in the background |
//! | `GET` | `/bundles/{id}?done=` | download, optionally mark done |
//! | `DELETE` | `/bundles/{id}` | purge one bundle or all `processed` ones |
//! | `GET` | `/process/{id}?tenant_id=&account_id=` | announce an existing bundle |

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use bundlegen_core::{BundleRegistry, Notifier, Publisher};
use tracing::{error, info, warn};

pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod routes;

pub use config::{LogFormat, ServerArgs};
pub use publisher::RestProxyPublisher;

/// Shared, immutable application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: BundleRegistry,
    pub notifier: Notifier,
    pub base_url: String,
    pub generation_timeout: Duration,
}

impl AppState {
    pub fn new(registry: BundleRegistry, notifier: Notifier, base_url: impl Into<String>) -> Self {
        Self {
            registry,
            notifier,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            generation_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Build the state described by `args`, connecting the publisher if
    /// one is configured. A publisher that cannot be created is logged and
    /// left absent.
    pub fn from_args(args: &ServerArgs) -> Self {
        let registry = BundleRegistry::new(&args.bundle_dir);
        let publisher = connect_publisher(args);
        let notifier = Notifier::new(registry.clone(), publisher)
            .with_topic(args.kafka_topic.clone())
            .with_timeout(args.publish_timeout());
        Self::new(registry, notifier, args.base_url.clone())
            .with_generation_timeout(args.generation_timeout())
    }
}

fn connect_publisher(args: &ServerArgs) -> Option<Arc<dyn Publisher>> {
    let Some(url) = args.kafka_url() else {
        warn!("KAFKA_HOST is empty, upload notifications are disabled");
        return None;
    };
    match RestProxyPublisher::new(&url, args.publish_timeout()) {
        Ok(publisher) => {
            info!(url = %url, topic = %args.kafka_topic, "publisher ready");
            Some(Arc::new(publisher))
        }
        Err(e) => {
            error!(url = %url, error = %e, "failed to connect to message bus");
            None
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route(
            "/bundles",
            get(routes::list_bundles)
                .post(routes::create_bundle)
                .delete(routes::delete_processed),
        )
        .route(
            "/bundles/",
            get(routes::list_bundles)
                .post(routes::create_bundle)
                .delete(routes::delete_processed),
        )
        .route(
            "/bundles/:bundle_id",
            get(routes::get_bundle).delete(routes::delete_bundle),
        )
        .route("/process/:bundle_id", get(routes::process_bundle))
        .with_state(state)
}
