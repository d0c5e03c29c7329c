#![forbid(unsafe_code)]

use anyhow::Context;
use bundlegen_server::{build_router, logging, AppState, ServerArgs};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    logging::init(&args.log_level, args.log_format);

    tokio::fs::create_dir_all(&args.bundle_dir)
        .await
        .with_context(|| format!("failed to create {}", args.bundle_dir.display()))?;

    let state = AppState::from_args(&args);
    let app = build_router(state);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(
        addr = %args.bind,
        bundle_dir = %args.bundle_dir.display(),
        base_url = %args.base_url,
        "bundlegen-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}
