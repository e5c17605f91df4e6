/**
 * TÉLÉMÉTRIE LIVE - implémentation de `TelemetrySource` pilotée par heartbeats
 *
 * RÔLE :
 * Affiche de vrais hôtes mesh au lieu du jitter. Un listener MQTT en
 * arrière-plan agrège les heartbeats dans un buffer partagé ; chaque
 * `LiveSource` (une par panneau monté) le lit.
 *
 * CORRESPONDANCE :
 * - mesh_load   = cpu moyen des hôtes connus
 * - memory_load = ram moyenne des hôtes connus
 * - mesh_nodes  = nombre d'hôtes connus
 * - premier heartbeat d'un hôte = événement "Node Joined" sur chaque flux
 * - flottes d'entités de l'écran conservées (bruitées comme en simulation)
 */

use rand::rngs::StdRng;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task;
use tracing::{debug, info, warn};

use super::entities::EntityFleet;
use super::feed::event_id;
use super::{panel_rng, SourceFactory, TelemetryError, TelemetryFrame, TelemetrySource};
use crate::config::{MqttConf, SourceKind};
use crate::models::{display_time, HeartbeatIn, LogEvent};
use crate::screens::ScreenConfig;
use crate::state::{new_state, Shared};

const JOIN_BACKLOG: usize = 64;

#[derive(Debug, Clone)]
struct HostSample {
    cpu: f32,
    ram: f32,
    ip: String,
}

#[derive(Debug, Default)]
pub struct LiveBuffer {
    hosts: HashMap<String, HostSample>,
    joins: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl LiveBuffer {
    pub fn shared() -> Shared<LiveBuffer> {
        new_state(LiveBuffer::default())
    }

    /// Retourne true si le heartbeat annonce un nouvel hôte.
    pub fn ingest(&mut self, hb: HeartbeatIn) -> bool {
        let is_new = !self.hosts.contains_key(&hb.host_id);
        if is_new {
            self.joins.push_back((self.next_seq, hb.host_id.clone()));
            self.next_seq += 1;
            while self.joins.len() > JOIN_BACKLOG {
                self.joins.pop_front();
            }
        }
        self.hosts.insert(
            hb.host_id,
            HostSample { cpu: hb.metrics.cpu, ram: hb.metrics.ram, ip: hb.net.ip },
        );
        is_new
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    fn readings(&self) -> Vec<(String, f64)> {
        if self.hosts.is_empty() {
            return Vec::new();
        }
        let n = self.hosts.len() as f64;
        let cpu = self.hosts.values().map(|h| h.cpu as f64).sum::<f64>() / n;
        let ram = self.hosts.values().map(|h| h.ram as f64).sum::<f64>() / n;
        vec![
            ("mesh_load".to_string(), round1(cpu)),
            ("memory_load".to_string(), round1(ram)),
            ("mesh_nodes".to_string(), n),
        ]
    }

    fn join_after(&self, cursor: u64) -> Option<(u64, String, String)> {
        self.joins.iter().find(|(seq, _)| *seq >= cursor).map(|(seq, host)| {
            let ip = self.hosts.get(host).map(|h| h.ip.clone()).unwrap_or_default();
            (*seq, host.clone(), ip)
        })
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub struct LiveSource {
    buffer: Shared<LiveBuffer>,
    seeds: Vec<(String, f64)>,
    cursors: HashMap<String, u64>,
    fleet: Option<EntityFleet>,
    rng: StdRng,
}

impl LiveSource {
    pub fn new(buffer: Shared<LiveBuffer>, screen: &ScreenConfig) -> Self {
        let start = buffer.lock().next_seq;
        Self {
            seeds: screen.metrics.iter().map(|m| (m.name.clone(), m.initial)).collect(),
            cursors: screen.feeds.iter().map(|f| (f.name.clone(), start)).collect(),
            fleet: screen.entities.clone().map(EntityFleet::new),
            buffer,
            rng: panel_rng(None),
        }
    }

    fn frame(&self) -> TelemetryFrame {
        let live = self.buffer.lock().readings();
        let mut readings = self.seeds.clone();
        for (name, value) in live {
            match readings.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => readings.push((name, value)),
            }
        }
        TelemetryFrame {
            readings,
            entities: self.fleet.as_ref().map(|f| f.entities().to_vec()),
        }
    }
}

impl TelemetrySource for LiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn initial_frame(&self) -> TelemetryFrame {
        self.frame()
    }

    fn tick_metrics(&mut self) -> TelemetryFrame {
        if let Some(fleet) = self.fleet.as_mut() {
            fleet.tick(&mut self.rng);
        }
        self.frame()
    }

    fn tick_feed(&mut self, feed: &str, now: OffsetDateTime) -> Option<LogEvent> {
        let cursor = *self.cursors.get(feed)?;
        let (seq, host, ip) = self.buffer.lock().join_after(cursor)?;
        self.cursors.insert(feed.to_string(), seq + 1);
        Some(LogEvent {
            id: event_id(&mut self.rng),
            kind: "Node Joined".to_string(),
            timestamp: display_time(now),
            value: Some(if ip.is_empty() { host } else { format!("{host} ({ip})") }),
        })
    }

    fn reseed(&mut self) {
        if let Some(fleet) = self.fleet.as_mut() {
            fleet.reseed();
        }
        debug!("live readings ignore reseed");
    }
}

pub struct LiveFactory {
    buffer: Shared<LiveBuffer>,
}

impl LiveFactory {
    pub fn new(buffer: Shared<LiveBuffer>) -> Self {
        Self { buffer }
    }
}

impl SourceFactory for LiveFactory {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn create(&self, screen: &ScreenConfig) -> Result<Box<dyn TelemetrySource>, TelemetryError> {
        Ok(Box::new(LiveSource::new(self.buffer.clone(), screen)))
    }
}

pub fn parse_heartbeat(payload: &[u8]) -> Option<HeartbeatIn> {
    serde_json::from_slice(payload).ok()
}

/// Abonné en arrière-plan qui remplit `buffer` depuis le topic heartbeat.
pub fn spawn_heartbeat_listener(cfg: &MqttConf, buffer: Shared<LiveBuffer>) {
    let cfg = cfg.clone();
    task::spawn(async move {
        let mut opts = MqttOptions::new("sovereign-kernel-live", &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        if let Err(e) = client.subscribe(&cfg.topic, QoS::AtLeastOnce).await {
            warn!(error = ?e, "heartbeat subscribe failed");
            return;
        }
        info!(topic = %cfg.topic, host = %cfg.host, port = cfg.port, "live telemetry listening");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == cfg.topic => {
                    match parse_heartbeat(&p.payload) {
                        Some(hb) => {
                            let host = hb.host_id.clone();
                            if buffer.lock().ingest(hb) {
                                info!(%host, "mesh host joined");
                            }
                        }
                        None => warn!(topic = %p.topic, "invalid heartbeat payload"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, "MQTT error, retrying");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metrics, NetInfo};
    use crate::screens::Screen;

    fn hb(host: &str, cpu: f32, ram: f32) -> HeartbeatIn {
        HeartbeatIn {
            host_id: host.into(),
            ts: "2025-01-01T00:00:00Z".into(),
            metrics: Metrics { cpu, ram },
            net: NetInfo { ip: "10.0.0.2".into() },
        }
    }

    #[test]
    fn test_live_readings_override_seeds() {
        let buffer = LiveBuffer::shared();
        let cfg = ScreenConfig::for_screen(Screen::Dashboard);
        let mut src = LiveSource::new(buffer.clone(), &cfg);

        let seeded = src.initial_frame();
        assert!(seeded.readings.iter().any(|(n, v)| n == "mesh_load" && *v == 40.0));

        buffer.lock().ingest(hb("a", 20.0, 50.0));
        buffer.lock().ingest(hb("b", 40.0, 70.0));
        let frame = src.tick_metrics();
        let get = |name: &str| frame.readings.iter().find(|(n, _)| n == name).map(|(_, v)| *v);
        assert_eq!(get("mesh_load"), Some(30.0));
        assert_eq!(get("memory_load"), Some(60.0));
        assert_eq!(get("mesh_nodes"), Some(2.0));
    }

    #[test]
    fn test_joins_become_events_once_per_feed() {
        let buffer = LiveBuffer::shared();
        buffer.lock().ingest(hb("before-mount", 1.0, 1.0));
        let cfg = ScreenConfig::for_screen(Screen::Dashboard);
        let mut src = LiveSource::new(buffer.clone(), &cfg);
        let now = OffsetDateTime::UNIX_EPOCH;

        assert!(src.tick_feed("network", now).is_none());
        assert!(buffer.lock().ingest(hb("h1", 1.0, 1.0)));
        assert!(!buffer.lock().ingest(hb("h1", 2.0, 1.0)));

        let ev = src.tick_feed("network", now).unwrap();
        assert_eq!(ev.kind, "Node Joined");
        assert_eq!(ev.value.as_deref(), Some("h1 (10.0.0.2)"));
        assert!(src.tick_feed("network", now).is_none());
    }

    #[test]
    fn test_live_source_keeps_screen_entities() {
        let buffer = LiveBuffer::shared();
        let cfg = ScreenConfig::for_screen(Screen::Network);
        let mut src = LiveSource::new(buffer, &cfg);

        let ids: Vec<String> = src.initial_frame().entities.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["LDN-01", "NYC-04", "TKO-09", "BER-11", "SGP-02"]);
        assert_eq!(src.tick_metrics().entities.map(|e| e.len()), Some(5));

        let swarm = LiveSource::new(LiveBuffer::shared(), &ScreenConfig::for_screen(Screen::Command));
        assert!(swarm.initial_frame().entities.is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn test_parse_heartbeat() {
        let raw = br#"{"host_id":"n1","ts":"x","metrics":{"cpu":1.5,"ram":2.0},"net":{"ip":"1.2.3.4"}}"#;
        assert_eq!(parse_heartbeat(raw).unwrap().host_id, "n1");
        assert!(parse_heartbeat(b"nope").is_none());
    }
}
