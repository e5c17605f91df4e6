//! Flottes d'entités décoratives (noeuds mesh, essaim cinétique).

use rand::Rng;

use crate::models::{EntityKind, EntityStatus, SimulatedEntity};

/// Plage plausible et jitter par tick d'un attribut numérique.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeRange {
    pub min: f64,
    pub max: f64,
    pub delta: f64,
}

pub const BATTERY: AttributeRange = AttributeRange { min: 0.0, max: 100.0, delta: 1.5 };
pub const ALTITUDE: AttributeRange = AttributeRange { min: 0.0, max: 2000.0, delta: 8.0 };
pub const SPEED: AttributeRange = AttributeRange { min: 0.0, max: 40.0, delta: 2.0 };
pub const HEALTH: AttributeRange = AttributeRange { min: 0.0, max: 100.0, delta: 2.0 };
pub const LATENCY: AttributeRange = AttributeRange { min: 1.0, max: 400.0, delta: 6.0 };

impl AttributeRange {
    fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    fn jitter<R: Rng + ?Sized>(&self, v: f64, rng: &mut R) -> f64 {
        let step = rng.gen_range(-self.delta..=self.delta);
        // une décimale suffit à l'affichage
        (self.clamp(v + step) * 10.0).round() / 10.0
    }
}

fn clamp_attrs(e: &mut SimulatedEntity) {
    e.battery = e.battery.map(|v| BATTERY.clamp(v));
    e.altitude = e.altitude.map(|v| ALTITUDE.clamp(v));
    e.speed = e.speed.map(|v| SPEED.clamp(v));
    e.health = e.health.map(|v| HEALTH.clamp(v));
    e.latency_ms = e.latency_ms.map(|v| LATENCY.clamp(v));
}

#[derive(Debug, Clone)]
pub struct EntityFleet {
    seed: Vec<SimulatedEntity>,
    entities: Vec<SimulatedEntity>,
}

impl EntityFleet {
    pub fn new(mut seed: Vec<SimulatedEntity>) -> Self {
        seed.iter_mut().for_each(clamp_attrs);
        Self { entities: seed.clone(), seed }
    }

    pub fn entities(&self) -> &[SimulatedEntity] {
        &self.entities
    }

    pub fn reseed(&mut self) {
        self.entities = self.seed.clone();
    }

    /// Les entités offline restent figées ; les autres attributs présents
    /// dérivent dans leur plage.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for e in self.entities.iter_mut().filter(|e| e.status != EntityStatus::Offline) {
            e.battery = e.battery.map(|v| BATTERY.jitter(v, rng));
            e.altitude = e.altitude.map(|v| ALTITUDE.jitter(v, rng));
            e.speed = e.speed.map(|v| SPEED.jitter(v, rng));
            e.health = e.health.map(|v| HEALTH.jitter(v, rng));
            e.latency_ms = e.latency_ms.map(|v| LATENCY.jitter(v, rng));
        }
    }
}

fn node(id: &str, location: &str, status: EntityStatus, latency: Option<f64>, health: f64) -> SimulatedEntity {
    SimulatedEntity {
        id: id.to_string(),
        label: location.to_string(),
        kind: EntityKind::MeshNode,
        status,
        battery: None,
        altitude: None,
        speed: None,
        health: Some(health),
        latency_ms: latency,
    }
}

/// Liste fixe de l'explorateur mesh.
pub fn mesh_nodes() -> Vec<SimulatedEntity> {
    vec![
        node("LDN-01", "London, UK", EntityStatus::Active, Some(42.0), 98.0),
        node("NYC-04", "New York, USA", EntityStatus::Active, Some(12.0), 100.0),
        node("TKO-09", "Tokyo, JP", EntityStatus::Syncing, Some(158.0), 65.0),
        node("BER-11", "Berlin, DE", EntityStatus::Active, Some(28.0), 92.0),
        node("SGP-02", "Singapore, SG", EntityStatus::Offline, None, 0.0),
    ]
}

fn unit(
    id: &str,
    kind: EntityKind,
    status: EntityStatus,
    battery: f64,
    altitude: Option<f64>,
    speed: Option<f64>,
) -> SimulatedEntity {
    SimulatedEntity {
        id: id.to_string(),
        label: format!("{kind:?} {id}"),
        kind,
        status,
        battery: Some(battery),
        altitude,
        speed,
        health: Some(100.0),
        latency_ms: None,
    }
}

/// Essaim du commandement autonome.
pub fn kinetic_swarm() -> Vec<SimulatedEntity> {
    use EntityKind::*;
    use EntityStatus::*;
    vec![
        unit("DRN-01", Drone, InFlight, 84.0, Some(120.0), Some(14.0)),
        unit("DRN-02", Drone, Scanning, 62.0, Some(80.0), Some(6.0)),
        unit("DRN-05", Drone, Charging, 23.0, None, None),
        unit("UGV-07", Ugv, Idle, 91.0, None, None),
        unit("HMN-03", Humanoid, Scanning, 47.0, None, Some(1.5)),
        unit("SAT-11", Satellite, Active, 100.0, Some(1800.0), Some(38.0)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn in_range(v: Option<f64>, r: AttributeRange) -> bool {
        v.map_or(true, |v| (r.min..=r.max).contains(&v))
    }

    #[test]
    fn test_swarm_attributes_stay_plausible() {
        let mut rng = StdRng::seed_from_u64(77);
        let mut fleet = EntityFleet::new(kinetic_swarm());
        for _ in 0..2000 {
            fleet.tick(&mut rng);
            for e in fleet.entities() {
                assert!(in_range(e.battery, BATTERY), "{} battery {:?}", e.id, e.battery);
                assert!(in_range(e.altitude, ALTITUDE));
                assert!(in_range(e.speed, SPEED));
                assert!(in_range(e.health, HEALTH));
            }
        }
    }

    #[test]
    fn test_offline_node_is_frozen() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut fleet = EntityFleet::new(mesh_nodes());
        for _ in 0..50 {
            fleet.tick(&mut rng);
        }
        let sgp = fleet.entities().iter().find(|e| e.id == "SGP-02").unwrap();
        assert_eq!(sgp.health, Some(0.0));
        assert_eq!(sgp.latency_ms, None);
    }

    #[test]
    fn test_reseed_restores_seed_list() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut fleet = EntityFleet::new(mesh_nodes());
        fleet.tick(&mut rng);
        fleet.reseed();
        assert_eq!(fleet.entities(), mesh_nodes().as_slice());
    }
}
