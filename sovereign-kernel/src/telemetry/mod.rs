//! Sources de télémétrie alimentant les panneaux.
//!
//! `TelemetrySource` sépare un panneau de l'origine de ses chiffres.
//! `SimulatedSource` bruite les métriques déclarées et tire des événements
//! dans des vocabulaires pondérés ; `live::LiveSource` projette les
//! heartbeats MQTT sur les mêmes frames. Le panneau ignore laquelle il a reçue.

pub mod entities;
pub mod feed;
pub mod live;
pub mod metric;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::config::SourceKind;
use crate::models::{LogEvent, SimulatedEntity};
use crate::screens::ScreenConfig;
use entities::EntityFleet;
use feed::{EventGenerator, FeedSpec};
use metric::{JitteredMetric, MetricSpec};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("metric {name}: {reason}")]
    InvalidMetric { name: String, reason: String },
    #[error("feed {name}: {reason}")]
    InvalidFeed { name: String, reason: String },
}

/// Données d'un tick du timer métriques.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    pub readings: Vec<(String, f64)>,
    /// `None` laisse les entités du panneau intactes.
    pub entities: Option<Vec<SimulatedEntity>>,
}

pub trait TelemetrySource: Send {
    fn kind(&self) -> SourceKind;

    /// Valeurs affichées juste après le montage, avant tout tick.
    fn initial_frame(&self) -> TelemetryFrame;

    fn tick_metrics(&mut self) -> TelemetryFrame;

    fn tick_feed(&mut self, feed: &str, now: OffsetDateTime) -> Option<LogEvent>;

    /// Retour aux valeurs initiales (recalibrage demandé par l'utilisateur).
    fn reseed(&mut self);
}

/// Construit une source neuve à chaque montage : aucun état ne survit à la navigation.
pub trait SourceFactory: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn create(&self, screen: &ScreenConfig) -> Result<Box<dyn TelemetrySource>, TelemetryError>;
}

pub struct SimulatedSource {
    metrics: Vec<JitteredMetric>,
    feeds: HashMap<String, EventGenerator>,
    fleet: Option<EntityFleet>,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(
        metrics: &[MetricSpec],
        feeds: &[FeedSpec],
        fleet: Option<Vec<SimulatedEntity>>,
        rng: StdRng,
    ) -> Result<Self, TelemetryError> {
        let metrics = metrics
            .iter()
            .cloned()
            .map(JitteredMetric::new)
            .collect::<Result<Vec<_>, _>>()?;
        let feeds = feeds
            .iter()
            .cloned()
            .map(|spec| Ok((spec.name.clone(), EventGenerator::new(spec)?)))
            .collect::<Result<HashMap<_, _>, TelemetryError>>()?;
        Ok(Self {
            metrics,
            feeds,
            fleet: fleet.map(EntityFleet::new),
            rng,
        })
    }

    pub fn for_screen(screen: &ScreenConfig, rng: StdRng) -> Result<Self, TelemetryError> {
        Self::new(&screen.metrics, &screen.feeds, screen.entities.clone(), rng)
    }

    fn frame(&self) -> TelemetryFrame {
        TelemetryFrame {
            readings: self.metrics.iter().map(|m| (m.name().to_string(), m.value())).collect(),
            entities: self.fleet.as_ref().map(|f| f.entities().to_vec()),
        }
    }
}

impl TelemetrySource for SimulatedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn initial_frame(&self) -> TelemetryFrame {
        self.frame()
    }

    fn tick_metrics(&mut self) -> TelemetryFrame {
        for m in self.metrics.iter_mut() {
            m.tick(&mut self.rng);
        }
        if let Some(fleet) = self.fleet.as_mut() {
            fleet.tick(&mut self.rng);
        }
        self.frame()
    }

    fn tick_feed(&mut self, feed: &str, now: OffsetDateTime) -> Option<LogEvent> {
        self.feeds.get(feed)?.tick(&mut self.rng, now)
    }

    fn reseed(&mut self) {
        self.metrics.iter_mut().for_each(JitteredMetric::reseed);
        if let Some(fleet) = self.fleet.as_mut() {
            fleet.reseed();
        }
    }
}

/// Avec une graine, chaque montage rejoue la même simulation.
pub struct SimulatedFactory {
    seed: Option<u64>,
}

impl SimulatedFactory {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

pub fn panel_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

impl SourceFactory for SimulatedFactory {
    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn create(&self, screen: &ScreenConfig) -> Result<Box<dyn TelemetrySource>, TelemetryError> {
        Ok(Box::new(SimulatedSource::for_screen(screen, panel_rng(self.seed))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screens::Screen;

    #[test]
    fn test_simulated_source_follows_screen_config() {
        let cfg = ScreenConfig::for_screen(Screen::Security);
        let mut src = SimulatedSource::for_screen(&cfg, panel_rng(Some(1))).unwrap();

        let initial = src.initial_frame();
        assert_eq!(initial.readings, vec![("threat_level".to_string(), 12.0)]);

        for _ in 0..20 {
            src.tick_metrics();
        }
        src.reseed();
        assert_eq!(src.initial_frame(), initial);

        let ev = src.tick_feed("tactical", OffsetDateTime::UNIX_EPOCH).unwrap();
        assert!(ev.kind == "encryption_rotation" || ev.kind == "intrusion_blocked");
        assert!(src.tick_feed("unknown", OffsetDateTime::UNIX_EPOCH).is_none());
    }

    #[test]
    fn test_seeded_factory_replays_same_run() {
        let cfg = ScreenConfig::for_screen(Screen::Dashboard);
        let factory = SimulatedFactory::new(Some(99));
        let mut a = factory.create(&cfg).unwrap();
        let mut b = factory.create(&cfg).unwrap();
        for _ in 0..10 {
            assert_eq!(a.tick_metrics(), b.tick_metrics());
        }
    }

    #[test]
    fn test_network_screen_carries_entities() {
        let cfg = ScreenConfig::for_screen(Screen::Network);
        let mut src = SimulatedSource::for_screen(&cfg, panel_rng(Some(3))).unwrap();
        let frame = src.tick_metrics();
        assert_eq!(frame.entities.map(|e| e.len()), Some(5));
    }
}
