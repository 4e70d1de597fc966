use std::env;

use anyhow::{Context, Result};
use teller_api::build_app;
use teller_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("teller_api");

    let kb_root = env::var("TELLER_KB_ROOT").unwrap_or_else(|_| "kb".to_string());
    let bind = env::var("TELLER_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = build_app(&kb_root).await?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed binding {}", bind))?;
    tracing::info!(bind = %bind, kb_root = %kb_root, "teller api started");

    axum::serve(listener, app).await?;
    Ok(())
}
