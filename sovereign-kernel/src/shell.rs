//! Shell de navigation : au plus un panneau monté à la fois.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::info;

use crate::advisory::AdvisoryStatsView;
use crate::config::SourceKind;
use crate::panel::{PanelContext, PanelController, PanelError, PanelSnapshot};
use crate::screens::{Screen, ScreenConfig, UnknownScreen};

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error(transparent)]
    UnknownScreen(#[from] UnknownScreen),
    #[error("no active panel")]
    NoActivePanel,
    #[error(transparent)]
    Panel(#[from] PanelError),
}

pub struct MeshShell {
    ctx: PanelContext,
    active: Mutex<Option<PanelController>>,
}

impl MeshShell {
    pub fn new(ctx: PanelContext) -> Self {
        Self { ctx, active: Mutex::new(None) }
    }

    /// Démonte le panneau courant puis monte `screen` à neuf.
    /// Naviguer vers l'écran déjà affiché le réinitialise aussi.
    pub fn navigate(&self, screen: Screen) -> Result<PanelSnapshot, NavigationError> {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.unmount();
            info!(from = %previous.screen(), to = %screen, "navigating");
        }
        let panel = PanelController::mount(ScreenConfig::for_screen(screen), self.ctx.clone())?;
        let snapshot = panel.snapshot();
        *active = Some(panel);
        Ok(snapshot)
    }

    pub fn navigate_path(&self, path: &str) -> Result<PanelSnapshot, NavigationError> {
        self.navigate(path.parse()?)
    }

    /// Démonte le panneau courant, s'il y en a un.
    pub fn close(&self) {
        if let Some(panel) = self.active.lock().take() {
            panel.unmount();
        }
    }

    pub fn active(&self) -> Option<Screen> {
        self.active.lock().as_ref().map(PanelController::screen)
    }

    pub fn source_kind(&self) -> SourceKind {
        self.ctx.sources.kind()
    }

    pub fn advisory_stats(&self) -> AdvisoryStatsView {
        self.ctx.advisory.stats()
    }

    fn with_active<R>(
        &self,
        f: impl FnOnce(&PanelController) -> Result<R, PanelError>,
    ) -> Result<R, NavigationError> {
        let active = self.active.lock();
        let panel = active.as_ref().ok_or(NavigationError::NoActivePanel)?;
        Ok(f(panel)?)
    }

    pub fn snapshot(&self) -> Result<PanelSnapshot, NavigationError> {
        self.with_active(|p| Ok(p.snapshot()))
    }

    pub fn refresh(&self, reseed: bool) -> Result<Option<u64>, NavigationError> {
        self.with_active(|p| p.refresh(reseed))
    }

    pub fn set_parameters(&self, updates: &BTreeMap<String, String>) -> Result<Option<u64>, NavigationError> {
        self.with_active(|p| p.set_parameters(updates))
    }

    pub fn toggle_beacon(&self) -> Result<bool, NavigationError> {
        self.with_active(PanelController::toggle_beacon)
    }

    pub fn begin_onboarding(&self) -> Result<bool, NavigationError> {
        self.with_active(PanelController::begin_onboarding)
    }

    pub fn start_uplink(&self) -> Result<bool, NavigationError> {
        self.with_active(PanelController::start_uplink)
    }

    pub fn run_verification(&self) -> Result<bool, NavigationError> {
        self.with_active(PanelController::run_verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{AdvisoryClient, BackendError, CompletionBackend, CompletionRequest};
    use crate::config::PanelTimings;
    use crate::telemetry::SimulatedFactory;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct Offline;

    #[async_trait]
    impl CompletionBackend for Offline {
        async fn generate(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
            Err(BackendError::Transport("no route to host".into()))
        }
    }

    fn shell() -> MeshShell {
        MeshShell::new(PanelContext {
            advisory: Arc::new(AdvisoryClient::new(Arc::new(Offline), "m")),
            sources: Arc::new(SimulatedFactory::new(Some(1))),
            timings: PanelTimings::default(),
            seed: Some(1),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_replaces_active_panel() {
        let shell = shell();
        assert!(matches!(shell.snapshot(), Err(NavigationError::NoActivePanel)));

        shell.navigate(Screen::Security).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!shell.snapshot().unwrap().feeds["tactical"].is_empty());

        let snap = shell.navigate_path("dashboard").unwrap();
        assert_eq!(snap.screen, Screen::Dashboard);
        assert_eq!(shell.active(), Some(Screen::Dashboard));
        assert!(snap.feeds["network"].is_empty());
        assert_eq!(shell.source_kind(), SourceKind::Simulated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_screen_and_unsupported_action() {
        let shell = shell();
        assert!(matches!(shell.navigate_path("mainnet"), Err(NavigationError::UnknownScreen(_))));

        shell.navigate(Screen::Dashboard).unwrap();
        assert!(matches!(
            shell.toggle_beacon(),
            Err(NavigationError::Panel(PanelError::Unsupported { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_advisory_shows_link_unstable_fallback() {
        let shell = shell();
        shell.navigate(Screen::Governance).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let insight = shell.snapshot().unwrap().insight;
        assert!(insight.is_fallback);
        assert_eq!(insight.text, crate::advisory::LINK_UNSTABLE_FALLBACK);
        assert_eq!(shell.advisory_stats().fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unmounts() {
        let shell = shell();
        shell.navigate(Screen::Beacon).unwrap();
        shell.close();
        assert_eq!(shell.active(), None);
    }
}
