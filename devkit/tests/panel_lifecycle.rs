//! Cycle de vie des panneaux sur horloge tokio en pause : timers et travail
//! différé s'arrêtent au démontage, les refresh concurrents convergent.

use sovereign_devkit::{assert_quiescent, HeartbeatBuilder, PanelHarness, Reply, ScriptedBackend};
use sovereign_kernel::advisory::{CAPACITY_FALLBACK, LINK_UNSTABLE_FALLBACK};
use sovereign_kernel::config::PanelTimings;
use sovereign_kernel::screens::Screen;
use sovereign_kernel::telemetry::live::{LiveBuffer, LiveFactory};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_no_mutation_after_unmount_on_any_screen() {
    let harness = PanelHarness::with_backend(ScriptedBackend::always(Reply::delayed(
        "late insight",
        Duration::from_secs(4),
    )));

    for screen in Screen::ALL {
        let panel = harness.mount(screen).unwrap();
        // laisse du travail différé en vol quand l'écran en a
        match screen {
            Screen::Beacon => {
                panel.toggle_beacon().unwrap();
            }
            Screen::Verify => {
                panel.run_verification().unwrap();
            }
            Screen::Uplink => {
                panel.start_uplink().unwrap();
            }
            Screen::Identity => {
                panel.begin_onboarding().unwrap();
            }
            _ => {}
        }
        harness.advance(Duration::from_millis(3500)).await;

        panel.unmount();
        assert_quiescent(&panel, Duration::from_secs(60)).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_navigation_mounts_a_fresh_panel() {
    let harness = PanelHarness::new();
    let shell = harness.shell();
    shell.navigate(Screen::Security).unwrap();
    harness.advance(Duration::from_secs(5)).await;
    let before = shell.snapshot().unwrap().revision;
    assert!(before > 0);

    let next = shell.navigate(Screen::Network).unwrap();
    assert_eq!(next.revision, 0);
    harness.advance(Duration::from_secs(30)).await;
    assert_eq!(shell.active(), Some(Screen::Network));
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_refreshes_last_resolved_wins() {
    let backend = ScriptedBackend::new(
        vec![
            Reply::text("initial"),
            Reply::delayed("slow", Duration::from_secs(3)),
            Reply::delayed("fast", Duration::from_secs(1)),
        ],
        Reply::text("unused"),
    );
    let harness = PanelHarness::with_backend(backend);
    let panel = harness.mount(Screen::Governance).unwrap();

    assert_eq!(panel.refresh(false).unwrap(), Some(2));
    assert_eq!(panel.refresh(false).unwrap(), Some(3));

    harness.advance(Duration::from_millis(1500)).await;
    let mid = panel.snapshot().insight;
    assert_eq!(mid.text, "fast");
    assert_eq!(mid.resolved_request, Some(3));
    assert!(mid.loading, "request 2 still pending");

    harness.advance(Duration::from_secs(2)).await;
    let done = panel.snapshot().insight;
    assert_eq!(done.text, "slow");
    assert_eq!(done.resolved_request, Some(2));
    assert!(!done.loading);
    assert!(!done.is_fallback);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_panel_shows_capacity_fallback() {
    let harness = PanelHarness::with_backend(ScriptedBackend::always(Reply::RateLimited));
    let panel = harness.mount(Screen::Atlas).unwrap();

    harness.advance(Duration::from_secs(10)).await;
    let insight = panel.snapshot().insight;
    assert!(insight.is_fallback);
    assert_eq!(insight.text, CAPACITY_FALLBACK);
    assert_eq!(harness.backend.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_advisory_prompt_follows_parameters() {
    let harness = PanelHarness::new();
    let panel = harness.mount(Screen::Identity).unwrap();
    panel.set_parameter("alias", "Nova-7").unwrap();
    harness.settle().await;

    let prompts = harness.backend.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Alpha-Omega-42"));
    assert!(prompts[1].contains("Nova-7"));
}

#[tokio::test(start_paused = true)]
async fn test_live_source_drives_panel() {
    let buffer = LiveBuffer::shared();
    let harness = PanelHarness::new().with_sources(Arc::new(LiveFactory::new(buffer.clone())));
    let panel = harness.mount(Screen::Dashboard).unwrap();

    buffer.lock().ingest(HeartbeatBuilder::new("edge-01").cpu(20.0).ram(50.0).build());
    buffer.lock().ingest(HeartbeatBuilder::new("edge-02").cpu(40.0).ram(70.0).build());
    harness.advance(Duration::from_millis(3100)).await;

    let snap = panel.snapshot();
    assert_eq!(snap.metrics["mesh_nodes"], 2.0);
    assert_eq!(snap.metrics["mesh_load"], 30.0);
    assert_eq!(snap.metrics["memory_load"], 60.0);
    let feed = &snap.feeds["network"];
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].kind, "Node Joined");
    assert_eq!(feed[0].value.as_deref(), Some("edge-01 (10.0.0.10)"));
}

#[tokio::test(start_paused = true)]
async fn test_live_source_keeps_entity_fleets() {
    let harness = PanelHarness::new().with_sources(Arc::new(LiveFactory::new(LiveBuffer::shared())));

    let network = harness.mount(Screen::Network).unwrap();
    harness.advance(Duration::from_secs(10)).await;
    let nodes = network.snapshot().entities.unwrap();
    assert_eq!(nodes.len(), 5);
    assert_eq!(nodes[0].id, "LDN-01");
    network.unmount();

    let command = harness.mount(Screen::Command).unwrap();
    harness.advance(Duration::from_secs(10)).await;
    assert!(command.snapshot().entities.is_some_and(|swarm| !swarm.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_late_mount_diagnostics_keep_run_results() {
    // la sonde du montage répond tard, celle du run échoue
    let backend = ScriptedBackend::always(Reply::Fail);
    backend.push(Reply::delayed("ok", Duration::from_secs(30)));
    let harness = PanelHarness::with_backend(backend);
    let panel = harness.mount(Screen::Verify).unwrap();
    harness.settle().await;
    assert!(panel.run_verification().unwrap());

    harness.advance(Duration::from_secs(12)).await;
    let suite = panel.snapshot().verification.unwrap();
    assert!(!suite.running);
    assert_eq!(suite.diagnostics.api, "Link Failed");
    assert!(suite.report.as_deref().unwrap().contains("API UPLINK: LINK FAILED"));

    harness.advance(Duration::from_secs(30)).await;
    let later = panel.snapshot().verification.unwrap();
    assert_eq!(later.diagnostics.api, "Link Failed");
    assert!(later.report.unwrap().contains("API UPLINK: LINK FAILED"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_completion_shows_link_unstable() {
    let harness = PanelHarness::with_backend(ScriptedBackend::always(Reply::Empty));
    let panel = harness.mount(Screen::Governance).unwrap();
    harness.settle().await;

    let insight = panel.snapshot().insight;
    assert!(insight.is_fallback);
    assert_eq!(insight.text, LINK_UNSTABLE_FALLBACK);
    assert_eq!(harness.backend.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_metric_period() {
    let timings = PanelTimings { metric_tick_ms: 500, ..PanelTimings::default() };
    let harness = PanelHarness::new().with_timings(timings);
    let panel = harness.mount(Screen::Governance).unwrap();

    // montage + réponse du conseil, puis deux ticks métriques
    harness.advance(Duration::from_millis(1100)).await;
    assert_eq!(panel.revision(), 4);
}
