//! Balise active : découverte autonome de noeuds mesh externes.
//!
//! Tant qu'elle est active, chaque tick peut détecter un signal. Un signal
//! détecté est intégré `INTEGRATION_DELAY` plus tard, sauf si la balise a été
//! coupée (ou relancée) entre-temps ; `epoch` distingue ces cas.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use time::OffsetDateTime;

use crate::models::display_time;

pub const LOG_CAPACITY: usize = 15;
pub const DETECTION_PROBABILITY: f64 = 0.3;
pub const INTEGRATION_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconLevel {
    Info,
    Success,
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconLogEntry {
    pub msg: String,
    pub level: BeaconLevel,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    pub intensity: f64,
    pub encryption: String,
    pub discovered_at: String,
}

/// Détection en attente d'intégration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    pub id: String,
    pub epoch: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BeaconScanner {
    active: bool,
    #[serde(skip)]
    epoch: u64,
    log: VecDeque<BeaconLogEntry>,
    discovered: Vec<DiscoveredNode>,
}

impl BeaconScanner {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn log(&self) -> impl Iterator<Item = &BeaconLogEntry> {
        self.log.iter()
    }

    pub fn discovered(&self) -> &[DiscoveredNode] {
        &self.discovered
    }

    fn push_log(&mut self, msg: String, level: BeaconLevel, now: OffsetDateTime) {
        self.log.push_front(BeaconLogEntry { msg, level, timestamp: display_time(now) });
        self.log.truncate(LOG_CAPACITY);
    }

    /// Bascule la balise ; retourne le nouvel état.
    pub fn toggle(&mut self, now: OffsetDateTime) -> bool {
        self.active = !self.active;
        self.epoch += 1;
        if self.active {
            self.push_log(
                "Active Beacon initialized. Scanning wide-spectrum spatial frequencies...".into(),
                BeaconLevel::Info,
                now,
            );
        } else {
            self.push_log(
                "Beacon deactivated. Autonomous discovery suspended.".into(),
                BeaconLevel::Alert,
                now,
            );
        }
        self.active
    }

    /// Un tick de balise. Une balise inactive ne détecte rien.
    pub fn scan<R: Rng + ?Sized>(&mut self, rng: &mut R, now: OffsetDateTime) -> Option<PendingSignal> {
        if !self.active || !rng.gen_bool(DETECTION_PROBABILITY) {
            return None;
        }
        let id = format!("NODE-EXT-{}", rng.gen_range(1000..=9999));
        self.push_log(
            format!("Signal detected: {id}. Analyzing spatiotemporal signature..."),
            BeaconLevel::Info,
            now,
        );
        Some(PendingSignal { id, epoch: self.epoch })
    }

    /// Finalise une détection. Les signaux périmés (balise basculée depuis) sont ignorés.
    pub fn integrate<R: Rng + ?Sized>(
        &mut self,
        signal: &PendingSignal,
        rng: &mut R,
        now: OffsetDateTime,
    ) -> bool {
        if !self.active || signal.epoch != self.epoch {
            return false;
        }
        let id = signal.id.clone();
        self.push_log(format!("Identity verified. Handshaking with {id}..."), BeaconLevel::Success, now);
        self.discovered.insert(
            0,
            DiscoveredNode {
                label: format!("External Node {id}"),
                lat: rng.gen_range(-90.0..90.0),
                lng: rng.gen_range(-180.0..180.0),
                intensity: rng.gen(),
                encryption: "P2P-Layer".into(),
                discovered_at: display_time(now),
                id: id.clone(),
            },
        );
        self.push_log(format!("{id} autonomously integrated into mesh."), BeaconLevel::Success, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn detect(scanner: &mut BeaconScanner, rng: &mut StdRng) -> PendingSignal {
        let now = OffsetDateTime::UNIX_EPOCH;
        loop {
            if let Some(sig) = scanner.scan(rng, now) {
                return sig;
            }
        }
    }

    #[test]
    fn test_inactive_beacon_never_detects() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut b = BeaconScanner::default();
        assert!((0..200).all(|_| b.scan(&mut rng, OffsetDateTime::UNIX_EPOCH).is_none()));
        assert_eq!(b.log().count(), 0);
    }

    #[test]
    fn test_detection_then_integration() {
        let mut rng = StdRng::seed_from_u64(2);
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut b = BeaconScanner::default();
        assert!(b.toggle(now));

        let sig = detect(&mut b, &mut rng);
        let n: u32 = sig.id.strip_prefix("NODE-EXT-").unwrap().parse().unwrap();
        assert!((1000..=9999).contains(&n));

        assert!(b.integrate(&sig, &mut rng, now));
        assert_eq!(b.discovered()[0].id, sig.id);
        let latest = b.log().next().unwrap();
        assert_eq!(latest.level, BeaconLevel::Success);
        assert!(latest.msg.contains("integrated"));
    }

    #[test]
    fn test_signal_dropped_after_deactivation_or_restart() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut b = BeaconScanner::default();
        b.toggle(now);
        let sig = detect(&mut b, &mut rng);

        assert!(!b.toggle(now));
        assert_eq!(b.log().next().unwrap().level, BeaconLevel::Alert);
        assert!(!b.integrate(&sig, &mut rng, now));

        b.toggle(now);
        assert!(!b.integrate(&sig, &mut rng, now));
        assert!(b.discovered().is_empty());
    }

    #[test]
    fn test_log_capped_most_recent_first() {
        let mut rng = StdRng::seed_from_u64(4);
        let now = OffsetDateTime::UNIX_EPOCH;
        let mut b = BeaconScanner::default();
        b.toggle(now);
        for _ in 0..40 {
            let sig = detect(&mut b, &mut rng);
            b.integrate(&sig, &mut rng, now);
        }
        assert_eq!(b.log().count(), LOG_CAPACITY);
        assert_eq!(b.discovered().len(), 40);
    }
}
