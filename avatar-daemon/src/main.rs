//! Avatar daemon: HTTP front end for the fast and quality pipelines. Uses the
//! same `Generator` as the CLI.

use anyhow::Context;
use avatar_core::AvatarConfig;
use avatar_daemon::{build_app, AppState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avatar_core=info,avatar_daemon=info,tower_http=info")),
        )
        .init();

    let config_path = std::env::var_os("AVATAR_CONFIG").map(PathBuf::from);
    let config = AvatarConfig::load(config_path.as_deref())?;
    let layout = config.layout();
    layout
        .ensure_directories()
        .with_context(|| format!("failed to create project directories (e.g. {})", layout.videos_dir.display()))?;

    let host = std::env::var("AVATAR_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port = match std::env::var("AVATAR_PORT") {
        Ok(p) => p.parse::<u16>().with_context(|| format!("invalid AVATAR_PORT '{}'", p))?,
        Err(_) => config.server.port,
    };

    let app = build_app(AppState::new(config));
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("avatar daemon listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
