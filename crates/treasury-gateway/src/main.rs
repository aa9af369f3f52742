use std::net::SocketAddr;

use anyhow::Result as AnyResult;
use tracing::{info, warn};
use treasury_gateway::{bootstrap, build_router};
use treasury_platform::ServiceConfig;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "treasury_gateway=info,treasury_workflow=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    if config.staff.is_empty() {
        warn!("TREASURY_STAFF is empty, every request will be refused");
    }

    let state = bootstrap(&config).await?;
    let router = build_router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
