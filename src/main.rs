use std::sync::Arc;

use anyhow::Context;

use handie_onboarding::config::ServerConfig;
use handie_onboarding::onboarding::{
    OnboardingManager, OnboardingRouteState, StepRegistry, onboarding_routes, spawn_autosave_task,
};
use handie_onboarding::store::{LibSqlStore, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env();

    // ── Step catalog ─────────────────────────────────────────────────────
    let catalog = StepRegistry::handie_default();
    let settings = config.apply(catalog.settings());
    let registry = Arc::new(catalog.with_settings(settings.clone()));
    registry
        .ensure_valid()
        .context("onboarding step catalog failed its self-check")?;

    eprintln!("Handie onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/onboarding/{{user_id}}", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn ProfileStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let manager = Arc::new(OnboardingManager::new(Arc::clone(&registry), store));

    if settings.auto_save {
        let every = ServerConfig::save_interval(&settings);
        let _autosave_handle = spawn_autosave_task(Arc::clone(&manager), every);
        eprintln!("   Auto-save: every {}s", every.as_secs());
    } else {
        eprintln!("   Auto-save: disabled");
    }

    let app = onboarding_routes(OnboardingRouteState { manager });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Onboarding server started");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
