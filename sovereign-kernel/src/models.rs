use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

/// Un événement réseau synthétique tel qu'affiché dans un journal.
/// Jamais modifié après création.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Résultat d'un appel de conseil une fois résolu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryResult {
    pub text: String,
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    MeshNode,
    Drone,
    Ugv,
    Humanoid,
    Satellite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Active,
    Syncing,
    Offline,
    Idle,
    InFlight,
    Scanning,
    Charging,
    Emergency,
}

/// Noeud / drone / pair décoratif. Les attributs numériques pertinents pour
/// le type d'entité sont `Some`, les autres restent `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEntity {
    pub id: String,
    pub label: String,
    pub kind: EntityKind,
    pub status: EntityStatus,
    pub battery: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub health: Option<f64>,
    pub latency_ms: Option<f64>,
}

/// Payload heartbeat consommé par la télémétrie live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatIn {
    pub host_id: String,
    pub ts: String,
    pub metrics: Metrics,
    pub net: NetInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu: f32,
    pub ram: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetInfo {
    pub ip: String,
}

/// Horodatage `HH:MM:SS` utilisé par tous les flux.
pub fn display_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".to_string())
}
