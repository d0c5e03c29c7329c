//! Process configuration from flags and environment variables.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `BIND_ADDR` | Listen address (default: `0.0.0.0:8000`) |
//! | `BUNDLE_DIR` | Storage directory for archives (default: `/BUNDLE_DIR`) |
//! | `BUNDLE_BASE_URL` | Externally reachable base URL used in callbacks |
//! | `KAFKA_HOST` / `KAFKA_PORT` | Kafka REST proxy (default: `kafka:8082`), empty host disables notifications |
//! | `KAFKA_TOPIC` | Upload topic (default: `platform.upload.tower`) |
//! | `PUBLISH_TIMEOUT_SECS` | Bound for one notification send (default: 10) |
//! | `GENERATION_TIMEOUT_SECS` | Bound for one bundle generation (default: 300) |
//! | `LOG_LEVEL` | Minimum log severity when `RUST_LOG` is unset (default: `info`) |
//! | `LOG_FORMAT` | `text` or `json` (default: `text`) |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bundlegen_core::DEFAULT_TOPIC;
use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "bundlegen-server",
    version,
    about = "Generate synthetic analytics bundles and serve them over HTTP"
)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// Directory holding `{id}.tar.gz` archives and their `.done` markers.
    #[arg(long, env = "BUNDLE_DIR", default_value = "/BUNDLE_DIR")]
    pub bundle_dir: PathBuf,

    /// Base URL downstream consumers use to fetch bundles.
    #[arg(long, env = "BUNDLE_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Kafka REST proxy host. Empty disables notifications.
    #[arg(long, env = "KAFKA_HOST", default_value = "kafka")]
    pub kafka_host: String,

    /// Kafka REST proxy port.
    #[arg(long, env = "KAFKA_PORT", default_value_t = 8082)]
    pub kafka_port: u16,

    /// Topic upload notifications are published on.
    #[arg(long, env = "KAFKA_TOPIC", default_value = DEFAULT_TOPIC)]
    pub kafka_topic: String,

    #[arg(long, env = "PUBLISH_TIMEOUT_SECS", default_value_t = 10)]
    pub publish_timeout_secs: u64,

    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value_t = 300)]
    pub generation_timeout_secs: u64,

    /// Minimum log severity, used when `RUST_LOG` is not set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ServerArgs {
    /// REST proxy base URL, or `None` when notifications are disabled.
    pub fn kafka_url(&self) -> Option<String> {
        let host = self.kafka_host.trim();
        if host.is_empty() {
            None
        } else {
            Some(format!("http://{}:{}", host, self.kafka_port))
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}
