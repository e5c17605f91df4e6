/**
 * SOVEREIGN KERNEL - point d'entrée
 *
 * RÔLE :
 * Assemble config, client de conseil, source de télémétrie, shell de
 * navigation et API HTTP, puis sert jusqu'à l'arrêt.
 *
 * Le client de conseil et la fabrique de télémétrie sont construits une
 * seule fois ici et injectés dans chaque panneau via `PanelContext`.
 */

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sovereign_kernel::advisory::{AdvisoryClient, GeminiBackend};
use sovereign_kernel::config::{load_config, SourceKind};
use sovereign_kernel::health::HealthTracker;
use sovereign_kernel::http::{build_router, AppState};
use sovereign_kernel::panel::PanelContext;
use sovereign_kernel::screens::Screen;
use sovereign_kernel::shell::MeshShell;
use sovereign_kernel::telemetry::live::{spawn_heartbeat_listener, LiveBuffer, LiveFactory};
use sovereign_kernel::telemetry::{SimulatedFactory, SourceFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sovereign_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let backend = GeminiBackend::from_config(&cfg.advisory).context("building completion backend")?;
    let advisory = Arc::new(AdvisoryClient::from_config(&cfg.advisory, Arc::new(backend)));
    info!(model = %advisory.model(), "advisory client ready");

    let sources: Arc<dyn SourceFactory> = match cfg.telemetry.source {
        SourceKind::Simulated => Arc::new(SimulatedFactory::new(cfg.telemetry.seed)),
        SourceKind::Live => {
            let buffer = LiveBuffer::shared();
            spawn_heartbeat_listener(&cfg.telemetry.mqtt, buffer.clone());
            Arc::new(LiveFactory::new(buffer))
        }
    };
    info!(source = ?cfg.telemetry.source, "telemetry source selected");

    let shell = Arc::new(MeshShell::new(PanelContext {
        advisory,
        sources,
        timings: cfg.panels,
        seed: cfg.telemetry.seed,
    }));
    shell.navigate(Screen::Dashboard).context("mounting dashboard")?;

    let app = build_router(AppState { shell, health_tracker: HealthTracker::new() });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("binding {}", cfg.http.bind))?;
    info!("listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
