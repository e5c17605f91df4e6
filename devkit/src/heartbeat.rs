/*!
Builders de heartbeats pour la télémétrie live

Produisent des `HeartbeatIn` (ou leur payload MQTT brut) sans broker, pour
alimenter `LiveBuffer` directement ou `parse_heartbeat` dans les tests.
*/

use rand::Rng;
use sovereign_kernel::models::{HeartbeatIn, Metrics, NetInfo};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct HeartbeatBuilder {
    host_id: String,
    cpu: f32,
    ram: f32,
    ip: String,
}

impl HeartbeatBuilder {
    pub fn new(host_id: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
            cpu: 10.0,
            ram: 40.0,
            ip: "10.0.0.10".to_string(),
        }
    }

    pub fn cpu(mut self, cpu: f32) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn ram(mut self, ram: f32) -> Self {
        self.ram = ram;
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    /// Charge aléatoire plausible, cpu et ram dans [0, 100).
    pub fn random_load<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.cpu = rng.gen_range(0.0..100.0);
        self.ram = rng.gen_range(0.0..100.0);
        self
    }

    pub fn build(self) -> HeartbeatIn {
        HeartbeatIn {
            host_id: self.host_id,
            ts: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            metrics: Metrics { cpu: self.cpu, ram: self.ram },
            net: NetInfo { ip: self.ip },
        }
    }

    /// Octets JSON tels qu'ils arrivent sur le topic heartbeat.
    pub fn to_payload(self) -> Vec<u8> {
        serde_json::to_vec(&self.build()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sovereign_kernel::telemetry::live::parse_heartbeat;

    #[test]
    fn test_payload_parses_back() {
        let raw = HeartbeatBuilder::new("edge-01").cpu(55.5).ip("192.168.1.20").to_payload();
        let hb = parse_heartbeat(&raw).unwrap();
        assert_eq!(hb.host_id, "edge-01");
        assert_eq!(hb.metrics.cpu, 55.5);
        assert_eq!(hb.net.ip, "192.168.1.20");
    }

    #[test]
    fn test_random_load_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let hb = HeartbeatBuilder::new("h").random_load(&mut rng).build();
            assert!((0.0..100.0).contains(&hb.metrics.cpu));
            assert!((0.0..100.0).contains(&hb.metrics.ram));
        }
    }
}
