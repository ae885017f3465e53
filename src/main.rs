use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use resi::auth::{SecurityKeys, TokenSealer};
use resi::config::config;
use resi::demo::demo_surface;
use resi::is_development;
use resi::server::{create_router, serve, ServerOptions};
use resi::synthesis::ModelSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up SECURITY_* and RESI_* settings
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    tracing::info!("Starting resi demo server in {:?} mode", config.environment);

    let mut options = ServerOptions::from_config(config).context("invalid security key material")?;
    if options.security.is_none() && is_development!() {
        tracing::warn!("No SECURITY_* keys configured, generating throwaway keys for this run");
        options.security = Some(SecurityKeys::generate());
    }
    if options.security.is_none() {
        tracing::warn!(
            "No SECURITY_* keys configured, withAuthorization handlers run without token checks \
             and role-gated handlers answer 401"
        );
    }

    if options.client_builder {
        if let Some(dir) = &config.build.models_dir {
            match ModelSource::load_dir(dir).await {
                Ok(models) => {
                    tracing::info!("Loaded {} model file(s) from {}", models.len(), dir);
                    options.models = models;
                }
                Err(e) => tracing::warn!("No models loaded from {}: {}", dir, e),
            }
        }
    }

    let sealer = options.security.clone().map(|keys| Arc::new(TokenSealer::new(keys)));
    let surface = demo_surface(sealer, config.security.token_expiry_hours);
    println!("resi APIs:\n{}", surface.describe("  "));

    let router = create_router(surface, &options);
    serve(router, config.server.port)
        .await
        .with_context(|| format!("failed to serve on port {}", config.server.port))
}
