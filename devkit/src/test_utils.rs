/*!
Test Harness pour panneaux Sovereign

Monte des panneaux avec un backend de complétion scripté et une source
simulée à graine fixe. Prévu pour `#[tokio::test(start_paused = true)]` :
`advance` dort sur l'horloge en pause, qui saute directement à chaque échéance.
*/

use anyhow::Result;
use sovereign_kernel::advisory::AdvisoryClient;
use sovereign_kernel::config::PanelTimings;
use sovereign_kernel::panel::{PanelContext, PanelController};
use sovereign_kernel::screens::{Screen, ScreenConfig};
use sovereign_kernel::shell::MeshShell;
use sovereign_kernel::telemetry::{SimulatedFactory, SourceFactory};
use std::sync::Arc;
use std::time::Duration;

use crate::backend_stub::{Reply, ScriptedBackend};

pub const DEFAULT_SEED: u64 = 42;

pub struct PanelHarness {
    pub backend: Arc<ScriptedBackend>,
    pub advisory: Arc<AdvisoryClient>,
    sources: Arc<dyn SourceFactory>,
    timings: PanelTimings,
}

impl Default for PanelHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelHarness {
    pub fn new() -> Self {
        Self::with_backend(ScriptedBackend::always(Reply::text("Mesh nominal.")))
    }

    pub fn with_backend(backend: Arc<ScriptedBackend>) -> Self {
        env_logger::try_init().ok();
        let advisory = Arc::new(AdvisoryClient::new(backend.clone(), "scripted"));
        Self {
            backend,
            advisory,
            sources: Arc::new(SimulatedFactory::new(Some(DEFAULT_SEED))),
            timings: PanelTimings::default(),
        }
    }

    pub fn with_sources(mut self, sources: Arc<dyn SourceFactory>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_timings(mut self, timings: PanelTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn context(&self) -> PanelContext {
        PanelContext {
            advisory: self.advisory.clone(),
            sources: self.sources.clone(),
            timings: self.timings,
            seed: Some(DEFAULT_SEED),
        }
    }

    pub fn mount(&self, screen: Screen) -> Result<PanelController> {
        let panel = PanelController::mount(ScreenConfig::for_screen(screen), self.context())?;
        log::info!("🧪 mounted {} panel", screen);
        Ok(panel)
    }

    pub fn shell(&self) -> MeshShell {
        MeshShell::new(self.context())
    }

    pub async fn advance(&self, span: Duration) {
        tokio::time::sleep(span).await;
    }

    /// Laisse tourner les tâches déjà lancées sans vraiment avancer les timers.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Échoue si la révision du panneau bouge pendant que l'horloge avance de `span`.
pub async fn assert_quiescent(panel: &PanelController, span: Duration) -> Result<()> {
    let before = panel.revision();
    tokio::time::sleep(span).await;
    let after = panel.revision();
    if after != before {
        anyhow::bail!(
            "{} panel mutated after unmount: revision {} -> {}",
            panel.screen(),
            before,
            after
        );
    }
    log::info!("✅ {} panel quiet for {:?}", panel.screen(), span);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_harness_mounts_and_detects_activity() {
        let harness = PanelHarness::new();
        let panel = harness.mount(Screen::Dashboard).unwrap();
        harness.settle().await;
        assert_eq!(panel.snapshot().insight.text, "Mesh nominal.");

        // un panneau monté continue de ticker : pas quiescent
        assert!(assert_quiescent(&panel, Duration::from_secs(10)).await.is_err());

        panel.unmount();
        assert_quiescent(&panel, Duration::from_secs(10)).await.unwrap();
    }
}
