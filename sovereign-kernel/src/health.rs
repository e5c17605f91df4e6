use serde::Serialize;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::advisory::AdvisoryStatsView;
use crate::config::SourceKind;
use crate::screens::Screen;
use crate::shell::MeshShell;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub started_at: String,
    pub active_screen: Option<Screen>,
    pub telemetry_source: SourceKind,
    pub advisory: AdvisoryStatsView,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    started_at: OffsetDateTime,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now(), started_at: OffsetDateTime::now_utc() }
    }

    pub fn get_health(&self, shell: &MeshShell) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.format(&Rfc3339).unwrap_or_default(),
            active_screen: shell.active(),
            telemetry_source: shell.source_kind(),
            advisory: shell.advisory_stats(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

/// RSS lu dans `/proc` ; estimation fixe ailleurs.
fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    12.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{AdvisoryClient, BackendError, CompletionBackend, CompletionRequest};
    use crate::config::PanelTimings;
    use crate::panel::PanelContext;
    use crate::telemetry::SimulatedFactory;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl CompletionBackend for Silent {
        async fn generate(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
            Ok("ok".into())
        }
    }

    #[tokio::test]
    async fn test_health_reports_active_screen() {
        let shell = MeshShell::new(PanelContext {
            advisory: Arc::new(AdvisoryClient::new(Arc::new(Silent), "m")),
            sources: Arc::new(SimulatedFactory::new(None)),
            timings: PanelTimings::default(),
            seed: None,
        });
        let tracker = HealthTracker::new();
        assert_eq!(tracker.get_health(&shell).active_screen, None);

        shell.navigate(Screen::Network).unwrap();
        let health = tracker.get_health(&shell);
        assert_eq!(health.active_screen, Some(Screen::Network));
        assert_eq!(health.telemetry_source, SourceKind::Simulated);
        assert!(health.memory_usage_mb > 0.0);
        assert!(!health.started_at.is_empty());
    }
}
