/**
 * CONTRÔLEUR DE PANNEAU - runtime d'un écran monté
 *
 * RÔLE :
 * Possède l'état de l'écran (métriques, flux, entités, conseil, paramètres,
 * état des fonctions annexes) et les tâches tokio qui le modifient.
 *
 * CYCLE DE VIE :
 * - mount : source de télémétrie neuve, état initial, démarrage de chaque
 *   timer déclaré, première requête de conseil
 * - refresh / changement de paramètre : nouvelle requête (la dernière
 *   résolue l'emporte)
 * - unmount (ou drop) : `alive` passe à false et les timers sont annulés
 *
 * VIVACITÉ :
 * Toute écriture passe par `with_alive`, qui teste le flag sous le verrou
 * utilisé pour muter. Rien n'est appliqué après unmount, pas même une
 * réponse de conseil ou une intégration de balise déjà en vol.
 */

use parking_lot::Mutex;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::advisory::AdvisoryClient;
use crate::beacon::{BeaconScanner, PendingSignal, INTEGRATION_DELAY};
use crate::config::{PanelTimings, SourceKind};
use crate::models::{LogEvent, SimulatedEntity};
use crate::progress::{OnboardingStepper, UplinkTransfer};
use crate::screens::{Feature, Screen, ScreenConfig};
use crate::state::{new_state, Shared};
use crate::telemetry::feed::EventLog;
use crate::telemetry::{panel_rng, SourceFactory, TelemetryError, TelemetryFrame, TelemetrySource};
use crate::verification::{self, Diagnostics, VerificationSuite};

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("{screen} panel does not support {action}")]
    Unsupported { screen: Screen, action: &'static str },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("panel is no longer mounted")]
    Unmounted,
}

/// Collaborateurs injectés dans chaque panneau. Construits au démarrage.
#[derive(Clone)]
pub struct PanelContext {
    pub advisory: Arc<AdvisoryClient>,
    pub sources: Arc<dyn SourceFactory>,
    pub timings: PanelTimings,
    /// Graine du RNG propre au panneau (balise, vérification) ; aléatoire si absente.
    pub seed: Option<u64>,
}

#[derive(Debug, Default)]
struct Insight {
    text: String,
    is_fallback: bool,
    pending: u32,
    issued: u64,
    resolved_request: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightView {
    pub text: String,
    pub is_fallback: bool,
    pub loading: bool,
    /// Id de la requête dont la réponse est affichée.
    pub resolved_request: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub screen: Screen,
    pub title: &'static str,
    pub revision: u64,
    pub source: SourceKind,
    pub metrics: BTreeMap<String, f64>,
    pub feeds: BTreeMap<String, Vec<LogEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<SimulatedEntity>>,
    pub insight: InsightView,
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<OnboardingStepper>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink: Option<UplinkTransfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon: Option<BeaconScanner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSuite>,
}

struct PanelState {
    alive: bool,
    revision: u64,
    source: Box<dyn TelemetrySource>,
    rng: StdRng,
    metrics: BTreeMap<String, f64>,
    feeds: BTreeMap<String, EventLog>,
    entities: Option<Vec<SimulatedEntity>>,
    insight: Insight,
    parameters: BTreeMap<String, String>,
    onboarding: Option<OnboardingStepper>,
    uplink: Option<UplinkTransfer>,
    beacon: Option<BeaconScanner>,
    verification: Option<VerificationSuite>,
}

impl PanelState {
    fn touch(&mut self) {
        self.revision += 1;
    }

    fn apply(&mut self, frame: TelemetryFrame) {
        for (name, value) in frame.readings {
            self.metrics.insert(name, value);
        }
        if let Some(entities) = frame.entities {
            self.entities = Some(entities);
        }
    }
}

/// Exécute `f` seulement tant que le panneau est monté.
fn with_alive<R>(state: &Shared<PanelState>, f: impl FnOnce(&mut PanelState) -> R) -> Option<R> {
    let mut guard = state.lock();
    if !guard.alive {
        return None;
    }
    Some(f(&mut guard))
}

fn spawn_ticker<F>(state: Shared<PanelState>, period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut(&mut PanelState) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if with_alive(&state, &mut on_tick).is_none() {
                break;
            }
        }
    })
}

fn schedule_integration(state: Shared<PanelState>, signal: PendingSignal) {
    tokio::spawn(async move {
        sleep(INTEGRATION_DELAY).await;
        with_alive(&state, |s| {
            let Some(beacon) = s.beacon.as_mut() else { return };
            if beacon.integrate(&signal, &mut s.rng, OffsetDateTime::now_utc()) {
                s.touch();
            }
        });
    });
}

pub struct PanelController {
    config: ScreenConfig,
    ctx: PanelContext,
    source_kind: SourceKind,
    state: Shared<PanelState>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl PanelController {
    /// À appeler dans un runtime tokio : les timers sont lancés ici.
    pub fn mount(config: ScreenConfig, ctx: PanelContext) -> Result<Self, PanelError> {
        let source = ctx.sources.create(&config)?;
        let source_kind = source.kind();
        let frame = source.initial_frame();

        let mut state = PanelState {
            alive: true,
            revision: 0,
            source,
            rng: panel_rng(ctx.seed.map(|s| s.wrapping_add(1))),
            metrics: BTreeMap::new(),
            feeds: config
                .feeds
                .iter()
                .map(|f| (f.name.clone(), EventLog::new(f.capacity)))
                .collect(),
            entities: None,
            insight: Insight::default(),
            parameters: config.parameters.clone(),
            onboarding: config.has(Feature::Onboarding).then(OnboardingStepper::default),
            uplink: config.has(Feature::Uplink).then(UplinkTransfer::default),
            beacon: config.has(Feature::Beacon).then(BeaconScanner::default),
            verification: config.has(Feature::Verification).then(VerificationSuite::default),
        };
        state.apply(frame);

        let panel = Self {
            config,
            ctx,
            source_kind,
            state: new_state(state),
            timers: Mutex::new(Vec::new()),
        };
        panel.start_timers();
        panel.issue_advisory();
        if panel.config.has(Feature::Verification) {
            panel.spawn_diagnostics();
        }
        info!(screen = %panel.config.screen, source = ?source_kind, "panel mounted");
        Ok(panel)
    }

    fn start_timers(&self) {
        let mut timers = self.timers.lock();
        let timings = self.ctx.timings;

        timers.push(spawn_ticker(self.state.clone(), timings.metric_tick(), |s| {
            let frame = s.source.tick_metrics();
            s.apply(frame);
            s.touch();
        }));

        for feed in &self.config.feeds {
            let name = feed.name.clone();
            timers.push(spawn_ticker(self.state.clone(), feed.interval(), move |s| {
                let Some(event) = s.source.tick_feed(&name, OffsetDateTime::now_utc()) else { return };
                if let Some(log) = s.feeds.get_mut(&name) {
                    log.push(event);
                    s.touch();
                }
            }));
        }

        if self.config.has(Feature::Onboarding) || self.config.has(Feature::Uplink) {
            timers.push(spawn_ticker(self.state.clone(), timings.progress_tick(), |s| {
                let mut moved = false;
                if let Some(stepper) = s.onboarding.as_mut() {
                    moved |= stepper.tick();
                }
                if let Some(uplink) = s.uplink.as_mut() {
                    moved |= uplink.tick();
                }
                if moved {
                    s.touch();
                }
            }));
        }

        if self.config.has(Feature::Beacon) {
            let shared = self.state.clone();
            timers.push(spawn_ticker(self.state.clone(), timings.beacon_tick(), move |s| {
                let Some(beacon) = s.beacon.as_mut() else { return };
                if let Some(signal) = beacon.scan(&mut s.rng, OffsetDateTime::now_utc()) {
                    debug!(node = %signal.id, "beacon signal detected");
                    s.touch();
                    schedule_integration(shared.clone(), signal);
                }
            }));
        }
    }

    /// Lance une requête de conseil ; retourne son id, ou `None` si l'écran
    /// n'a pas de conseil ou si le panneau est démonté.
    fn issue_advisory(&self) -> Option<u64> {
        let spec = self.config.advisory.as_ref()?;
        let (request, prompt) = with_alive(&self.state, |s| {
            s.insight.issued += 1;
            s.insight.pending += 1;
            if s.insight.resolved_request.is_none() {
                s.insight.text = spec.loading_text.clone();
            }
            s.touch();
            (s.insight.issued, spec.render(&s.parameters, &s.metrics))
        })?;

        let client = self.ctx.advisory.clone();
        let state = self.state.clone();
        let system = spec.system_instruction.clone();
        let screen = self.config.screen;
        tokio::spawn(async move {
            let result = client.advise(&prompt, system.as_deref()).await;
            let applied = with_alive(&state, |s| {
                s.insight.pending = s.insight.pending.saturating_sub(1);
                s.insight.text = result.text;
                s.insight.is_fallback = result.is_fallback;
                s.insight.resolved_request = Some(request);
                s.touch();
            });
            match applied {
                Some(()) => debug!(%screen, request, "advisory resolved"),
                None => debug!(%screen, request, "advisory resolved after unmount, dropped"),
            }
        });
        Some(request)
    }

    fn spawn_diagnostics(&self) {
        let client = self.ctx.advisory.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let api = client.check_health().await;
            with_alive(&state, |s| {
                let Some(suite) = s.verification.as_mut() else { return };
                // une fois un run lancé, ses propres diagnostics font foi
                if suite.report.is_none() {
                    suite.diagnostics = Diagnostics::headless(api);
                    s.touch();
                }
            });
        });
    }

    fn spawn_verification_run(&self) {
        let client = self.ctx.advisory.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let api = client.check_health().await;
            let count = with_alive(&state, |s| {
                let suite = s.verification.as_mut()?;
                suite.diagnostics = Diagnostics::headless(api);
                let count = suite.tests.len();
                s.touch();
                Some(count)
            });
            let Some(count) = count.flatten() else { return };

            for index in 0..count {
                let wait = with_alive(&state, |s| {
                    if let Some(suite) = s.verification.as_mut() {
                        suite.mark_running(index);
                    }
                    s.touch();
                    verification::test_duration(&mut s.rng)
                });
                let Some(wait) = wait else { return };
                sleep(wait).await;

                let finished = with_alive(&state, |s| {
                    let passed = verification::draw_outcome(&mut s.rng);
                    if let Some(suite) = s.verification.as_mut() {
                        suite.finish_test(index, passed, OffsetDateTime::now_utc());
                    }
                    s.touch();
                });
                if finished.is_none() {
                    return;
                }
            }

            with_alive(&state, |s| {
                if let Some(suite) = s.verification.as_mut() {
                    suite.finish(OffsetDateTime::now_utc());
                    info!(passed = suite.passed(), total = suite.tests.len(), "verification run complete");
                }
                s.touch();
            });
        });
    }

    fn require(&self, feature: Feature, action: &'static str) -> Result<(), PanelError> {
        if self.config.has(feature) {
            Ok(())
        } else {
            Err(PanelError::Unsupported { screen: self.config.screen, action })
        }
    }

    pub fn screen(&self) -> Screen {
        self.config.screen
    }

    pub fn config(&self) -> &ScreenConfig {
        &self.config
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn is_mounted(&self) -> bool {
        self.state.lock().alive
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Relance le conseil ; `reseed` remet aussi la télémétrie à ses valeurs
    /// initiales. Appelable pendant qu'une requête précédente est en attente.
    pub fn refresh(&self, reseed: bool) -> Result<Option<u64>, PanelError> {
        if self.config.advisory.is_none() && !reseed {
            return Err(PanelError::Unsupported { screen: self.config.screen, action: "refresh" });
        }
        if reseed {
            with_alive(&self.state, |s| {
                s.source.reseed();
                let frame = s.source.initial_frame();
                s.apply(frame);
                s.touch();
            })
            .ok_or(PanelError::Unmounted)?;
        }
        if !self.is_mounted() {
            return Err(PanelError::Unmounted);
        }
        Ok(self.issue_advisory())
    }

    fn check_parameter(&self, name: &str, value: &str) -> Result<(), PanelError> {
        let invalid = |reason: String| PanelError::InvalidParameter { name: name.to_string(), reason };
        if !self.config.parameters.contains_key(name) {
            return Err(invalid(format!("{} panel has no such parameter", self.config.screen)));
        }
        if let Some(allowed) = self.config.choices.get(name) {
            if !allowed.iter().any(|v| v == value) {
                return Err(invalid(format!("expected one of {}", allowed.join(", "))));
            }
        }
        Ok(())
    }

    /// Applique toutes les mises à jour ou aucune. Un vrai changement relance le conseil.
    pub fn set_parameters(&self, updates: &BTreeMap<String, String>) -> Result<Option<u64>, PanelError> {
        for (name, value) in updates {
            self.check_parameter(name, value)?;
        }
        let changed = with_alive(&self.state, |s| {
            let mut changed = false;
            for (name, value) in updates {
                if s.parameters.get(name) != Some(value) {
                    s.parameters.insert(name.clone(), value.clone());
                    changed = true;
                }
            }
            if changed {
                s.touch();
            }
            changed
        })
        .ok_or(PanelError::Unmounted)?;
        Ok(if changed { self.issue_advisory() } else { None })
    }

    pub fn set_parameter(&self, name: &str, value: &str) -> Result<Option<u64>, PanelError> {
        let mut updates = BTreeMap::new();
        updates.insert(name.to_string(), value.to_string());
        self.set_parameters(&updates)
    }

    /// Retourne si la balise est désormais active.
    pub fn toggle_beacon(&self) -> Result<bool, PanelError> {
        self.require(Feature::Beacon, "beacon toggle")?;
        with_alive(&self.state, |s| {
            let active = s.beacon.as_mut().map(|b| b.toggle(OffsetDateTime::now_utc()));
            s.touch();
            active.unwrap_or(false)
        })
        .ok_or(PanelError::Unmounted)
    }

    pub fn begin_onboarding(&self) -> Result<bool, PanelError> {
        self.require(Feature::Onboarding, "onboarding")?;
        with_alive(&self.state, |s| {
            let started = s.onboarding.as_mut().map_or(false, |o| o.begin());
            if started {
                s.touch();
            }
            started
        })
        .ok_or(PanelError::Unmounted)
    }

    pub fn start_uplink(&self) -> Result<bool, PanelError> {
        self.require(Feature::Uplink, "uplink")?;
        with_alive(&self.state, |s| {
            let started = s.uplink.as_mut().map_or(false, |u| u.start());
            if started {
                s.touch();
            }
            started
        })
        .ok_or(PanelError::Unmounted)
    }

    /// Lance un run de vérification complet ; false si un run est déjà en cours.
    pub fn run_verification(&self) -> Result<bool, PanelError> {
        self.require(Feature::Verification, "verification")?;
        let started = with_alive(&self.state, |s| {
            let started = s.verification.as_mut().map_or(false, |v| v.start());
            if started {
                s.touch();
            }
            started
        })
        .ok_or(PanelError::Unmounted)?;
        if started {
            self.spawn_verification_run();
        }
        Ok(started)
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let s = self.state.lock();
        PanelSnapshot {
            screen: self.config.screen,
            title: self.config.screen.title(),
            revision: s.revision,
            source: self.source_kind,
            metrics: s.metrics.clone(),
            feeds: s.feeds.iter().map(|(name, log)| (name.clone(), log.to_vec())).collect(),
            entities: s.entities.clone(),
            insight: InsightView {
                text: s.insight.text.clone(),
                is_fallback: s.insight.is_fallback,
                loading: s.insight.pending > 0,
                resolved_request: s.insight.resolved_request,
            },
            parameters: s.parameters.clone(),
            onboarding: s.onboarding.clone(),
            uplink: s.uplink.clone(),
            beacon: s.beacon.clone(),
            verification: s.verification.clone(),
        }
    }

    /// Arrête tous les timers. Les écritures ultérieures, réponses de conseil
    /// en vol comprises, sont ignorées. Idempotent.
    pub fn unmount(&self) {
        let was_alive = std::mem::replace(&mut self.state.lock().alive, false);
        for handle in self.timers.lock().drain(..) {
            handle.abort();
        }
        if was_alive {
            info!(screen = %self.config.screen, "panel unmounted");
        }
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        self.unmount();
    }
}
